//! Request dispatcher.
//!
//! Turns `(verb, path, body)` into a [`Response`]: routes on the first path
//! segment, resolves the handler through the resource registry, invokes it
//! (or the CRUD gateway for resources) and renders the outcome. Every fault
//! stops at this boundary and becomes a fault envelope.

pub mod response;
pub mod route;

pub use response::Response;
pub use route::{ResourceOp, Route, RoutingConvention};

use crate::core::{Result, TtmError, WireRecord};
use crate::gateway::CrudGateway;
use crate::mapper::Payload;
use crate::registry::{Arguments, ResourceRegistry, unknown_method};
use http::Method;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;
use tracing::Instrument;

/// Where a request is in its lifecycle; recorded when it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    Idle,
    Routing,
    Invoking,
    Responding,
    Failed,
}

impl fmt::Display for DispatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Routing => "routing",
            Self::Invoking => "invoking",
            Self::Responding => "responding",
            Self::Failed => "failed",
        })
    }
}

#[derive(Debug)]
pub struct Dispatcher {
    resources: Arc<ResourceRegistry>,
    gateway: CrudGateway,
    convention: RoutingConvention,
    expose_internal_errors: bool,
}

impl Dispatcher {
    pub fn new(
        resources: Arc<ResourceRegistry>,
        gateway: CrudGateway,
        convention: RoutingConvention,
        expose_internal_errors: bool,
    ) -> Self {
        Self {
            resources,
            gateway,
            convention,
            expose_internal_errors,
        }
    }

    pub fn gateway(&self) -> &CrudGateway {
        &self.gateway
    }

    pub fn resources(&self) -> &Arc<ResourceRegistry> {
        &self.resources
    }

    /// Routing step alone: no lookup, no invocation.
    pub fn route(&self, method: &Method, path: &str) -> Result<Route> {
        route::route(&self.convention, method, path)
    }

    /// Handles one request end to end. Never fails: faults are rendered.
    pub async fn dispatch(&self, method: &Method, path: &str, body: &[u8]) -> Response {
        let span = tracing::info_span!("dispatch", %method, path);
        async move {
            let mut phase = DispatchPhase::Idle;
            match self.handle(method, path, body, &mut phase).await {
                Ok(response) => {
                    tracing::debug!(status = response.status.as_u16(), "request handled");
                    response
                }
                Err(err) => {
                    let failed_in = phase;
                    phase = DispatchPhase::Failed;
                    if err.is_internal() {
                        tracing::error!(%failed_in, %phase, code = err.code(), error = %err, "request failed");
                    } else {
                        tracing::warn!(%failed_in, %phase, code = err.code(), error = %err, "request rejected");
                    }
                    Response::fault(&err, self.expose_internal_errors)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn handle(
        &self,
        method: &Method,
        path: &str,
        body: &[u8],
        phase: &mut DispatchPhase,
    ) -> Result<Response> {
        *phase = DispatchPhase::Routing;
        let route = self.route(method, path)?;
        tracing::debug!(?route, "routed");
        let body = if route.takes_body(method) {
            parse_body(body)?
        } else {
            None
        };

        *phase = DispatchPhase::Invoking;
        let response = match route {
            Route::Command { alias, args } => {
                let command = self.resources.command(&alias)?;
                let payload = command.execute(Arguments::new(args, body)).await?;
                *phase = DispatchPhase::Responding;
                Response::found(self.render(&payload))
            }
            Route::Service {
                alias,
                method: name,
                args,
            } => {
                let service = self.resources.service(&alias)?;
                if !service.has_method(&name) {
                    return Err(unknown_method());
                }
                let payload = service.invoke(&name, Arguments::new(args, body)).await?;
                *phase = DispatchPhase::Responding;
                Response::found(self.render(&payload))
            }
            Route::Resource { alias, op } => self.resource(&alias, op, body, phase).await?,
        };
        Ok(response)
    }

    async fn resource(
        &self,
        alias: &str,
        op: ResourceOp,
        body: Option<JsonValue>,
        phase: &mut DispatchPhase,
    ) -> Result<Response> {
        let entity_type = self.resources.entity(alias)?;
        let gateway = &self.gateway;

        let response = match op {
            ResourceOp::GetAll => {
                let entities = gateway.get_all(&entity_type).await?;
                *phase = DispatchPhase::Responding;
                Response::found(self.render(&Payload::Entities(entities)))
            }
            ResourceOp::GetById(id) => {
                let entity = gateway.get(&entity_type, &id).await?;
                *phase = DispatchPhase::Responding;
                Response::found(entity.and_then(|entity| self.render(&Payload::Entity(entity))))
            }
            ResourceOp::GetByFilter { alias, predicate } => {
                let entities = gateway
                    .get_by_criteria(&entity_type, &alias, &predicate)
                    .await?;
                *phase = DispatchPhase::Responding;
                Response::found(self.render(&Payload::Entities(entities)))
            }
            ResourceOp::Create => {
                let record = require_record(body.as_ref())?;
                let created = gateway.create(&entity_type, record).await?;
                *phase = DispatchPhase::Responding;
                Response::created(self.render(&Payload::Entity(created)))
            }
            ResourceOp::Update => {
                let record = require_record(body.as_ref())?;
                gateway.update(&entity_type, record).await?;
                *phase = DispatchPhase::Responding;
                Response::accepted()
            }
            ResourceOp::Delete(id) => {
                gateway.delete(&entity_type, &id).await?;
                *phase = DispatchPhase::Responding;
                Response::no_content()
            }
        };
        Ok(response)
    }

    fn render(&self, payload: &Payload) -> Option<JsonValue> {
        self.gateway.mapper().render(payload)
    }
}

fn parse_body(body: &[u8]) -> Result<Option<JsonValue>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let value: JsonValue = serde_json::from_slice(body)?;
    Ok((!value.is_null()).then_some(value))
}

fn require_record(body: Option<&JsonValue>) -> Result<&WireRecord> {
    match body {
        Some(JsonValue::Object(record)) => Ok(record),
        Some(_) => Err(TtmError::argument("The object must be a JSON object")),
        None => Err(TtmError::argument("The object can't be null")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_null_bodies_are_absent() {
        assert_eq!(parse_body(b"").unwrap(), None);
        assert_eq!(parse_body(b"  \n").unwrap(), None);
        assert_eq!(parse_body(b"null").unwrap(), None);
        assert!(matches!(parse_body(b"{oops").unwrap_err(), TtmError::Argument(_)));
    }

    #[test]
    fn resources_need_an_object_body() {
        assert!(require_record(None).is_err());
        assert!(require_record(Some(&JsonValue::from(3))).is_err());
        let body = serde_json::json!({"name": "x"});
        assert_eq!(require_record(Some(&body)).unwrap().len(), 1);
    }
}
