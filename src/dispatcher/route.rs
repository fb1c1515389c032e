use crate::core::{Result, TtmError};
use crate::entity::EntityId;
use http::Method;
use serde::Deserialize;

/// First path segments that select commands and services.
///
/// Anything else in first position is a resource alias. Matching ignores
/// ASCII case.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RoutingConvention {
    pub command: String,
    pub service: String,
}

impl RoutingConvention {
    pub fn new(command: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            service: service.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() || self.service.trim().is_empty() {
            return Err(TtmError::configuration(
                "Routing segments for commands and services can't be empty",
            ));
        }
        if self.command.eq_ignore_ascii_case(&self.service) {
            return Err(TtmError::configuration(format!(
                "Commands and services can't share the routing segment '{}'",
                self.command
            )));
        }
        if self.command.contains('/') || self.service.contains('/') {
            return Err(TtmError::configuration("Routing segments can't contain '/'"));
        }
        Ok(())
    }
}

impl Default for RoutingConvention {
    fn default() -> Self {
        Self::new("command", "service")
    }
}

/// Operation requested on a resource alias.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceOp {
    GetAll,
    GetById(EntityId),
    /// `alias:predicate` parameter.
    GetByFilter {
        alias: String,
        predicate: String,
    },
    Create,
    Update,
    Delete(EntityId),
}

/// Where a request goes, decided from verb and path alone.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Command {
        alias: String,
        args: Vec<String>,
    },
    Service {
        alias: String,
        method: String,
        args: Vec<String>,
    },
    Resource {
        alias: String,
        op: ResourceOp,
    },
}

impl Route {
    /// Whether the request body should be parsed for this route.
    pub fn takes_body(&self, method: &Method) -> bool {
        match self {
            Self::Command { .. } | Self::Service { .. } => method == Method::POST,
            Self::Resource { op, .. } => matches!(op, ResourceOp::Create | ResourceOp::Update),
        }
    }
}

pub(crate) fn route(convention: &RoutingConvention, method: &Method, path: &str) -> Result<Route> {
    let segments: Vec<&str> = path.split('/').filter(|segment| !segment.is_empty()).collect();
    let Some((&first, rest)) = segments.split_first() else {
        return Err(TtmError::handler_not_found("Requested service/command not found"));
    };
    let owned = |parts: &[&str]| parts.iter().map(|part| part.to_string()).collect::<Vec<_>>();

    if first.eq_ignore_ascii_case(&convention.command) {
        require_get_or_post(method)?;
        let (alias, args) = rest
            .split_first()
            .ok_or_else(|| TtmError::argument("The command alias can't be null"))?;
        return Ok(Route::Command {
            alias: alias.to_string(),
            args: owned(args),
        });
    }

    if first.eq_ignore_ascii_case(&convention.service) {
        require_get_or_post(method)?;
        let (alias, rest) = rest
            .split_first()
            .ok_or_else(|| TtmError::argument("The service interface alias can't be null"))?;
        let (name, args) = rest
            .split_first()
            .ok_or_else(|| TtmError::argument("The method name can't be null"))?;
        return Ok(Route::Service {
            alias: alias.to_string(),
            method: name.to_string(),
            args: owned(args),
        });
    }

    let param = rest.first().copied();
    let op = match *method {
        Method::GET => match param {
            None => ResourceOp::GetAll,
            Some(param) => match EntityId::parse(param) {
                Some(id) => ResourceOp::GetById(id),
                None => filter(param)?,
            },
        },
        Method::POST => ResourceOp::Create,
        Method::PUT => ResourceOp::Update,
        Method::DELETE => {
            let id = param.and_then(EntityId::parse).ok_or_else(|| {
                TtmError::method_not_allowed("DELETE requires a numeric id parameter")
            })?;
            ResourceOp::Delete(id)
        }
        _ => return Err(TtmError::method_not_allowed("HTTP method invalid")),
    };

    Ok(Route::Resource {
        alias: first.to_string(),
        op,
    })
}

fn require_get_or_post(method: &Method) -> Result<()> {
    if method == Method::GET || method == Method::POST {
        Ok(())
    } else {
        Err(TtmError::method_not_allowed("HTTP method should be GET or POST"))
    }
}

fn filter(param: &str) -> Result<ResourceOp> {
    match param.split(':').collect::<Vec<_>>().as_slice() {
        [alias, predicate] if !alias.is_empty() && !predicate.trim().is_empty() => {
            Ok(ResourceOp::GetByFilter {
                alias: alias.to_string(),
                predicate: predicate.to_string(),
            })
        }
        _ => Err(TtmError::method_not_allowed(format!(
            "Resource parameter '{param}' is neither an id nor an 'alias:predicate' filter"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route_default(method: Method, path: &str) -> Result<Route> {
        route(&RoutingConvention::default(), &method, path)
    }

    #[test]
    fn command_segment_is_case_insensitive() {
        let route = route_default(Method::POST, "/CoMmAnD/reindex/full/").unwrap();
        assert_eq!(
            route,
            Route::Command {
                alias: "reindex".into(),
                args: vec!["full".into()],
            }
        );
    }

    #[test]
    fn empty_segments_are_discarded() {
        let route = route_default(Method::GET, "//service//billing/total//3").unwrap();
        assert_eq!(
            route,
            Route::Service {
                alias: "billing".into(),
                method: "total".into(),
                args: vec!["3".into()],
            }
        );
    }

    #[test]
    fn resource_parameters_select_the_operation() {
        let op = |method, path| match route_default(method, path).unwrap() {
            Route::Resource { op, .. } => op,
            other => panic!("expected resource route, got {other:?}"),
        };
        assert_eq!(op(Method::GET, "/widget"), ResourceOp::GetAll);
        assert_eq!(op(Method::GET, "/widget/42"), ResourceOp::GetById(EntityId::Scalar(42)));
        assert_eq!(
            op(Method::GET, "/widget/w:w.active=true"),
            ResourceOp::GetByFilter {
                alias: "w".into(),
                predicate: "w.active=true".into(),
            }
        );
        assert_eq!(op(Method::DELETE, "/widget/7"), ResourceOp::Delete(EntityId::Scalar(7)));
        assert_eq!(op(Method::PUT, "/widget"), ResourceOp::Update);
    }

    #[test]
    fn unsupported_verbs_are_rejected() {
        let err = route_default(Method::PATCH, "/widget/1").unwrap_err();
        assert!(matches!(err, TtmError::MethodNotAllowed(_)));
        let err = route_default(Method::PUT, "/command/reindex").unwrap_err();
        assert_eq!(err.to_string(), "HTTP method should be GET or POST");
    }

    #[test]
    fn missing_handler_segments_are_argument_faults() {
        assert!(matches!(
            route_default(Method::GET, "/service/billing").unwrap_err(),
            TtmError::Argument(_)
        ));
        assert!(matches!(
            route_default(Method::POST, "/command").unwrap_err(),
            TtmError::Argument(_)
        ));
    }

    #[test]
    fn unmatched_verb_parameter_combinations_are_not_allowed() {
        for (method, path) in [
            (Method::GET, "/widget/a:b:c"),
            (Method::GET, "/widget/abc"),
            (Method::GET, "/widget/w:"),
            (Method::DELETE, "/widget"),
            (Method::DELETE, "/widget/abc"),
            (Method::DELETE, "/widget/w:w.id=1"),
        ] {
            let err = route_default(method.clone(), path).unwrap_err();
            assert!(
                matches!(err, TtmError::MethodNotAllowed(_)),
                "{method} {path} gave {err:?}"
            );
        }
    }

    #[test]
    fn convention_can_rename_segments() {
        let convention = RoutingConvention::new("cmd", "svc");
        convention.validate().unwrap();
        let route = route(&convention, &Method::GET, "/command/5").unwrap();
        assert!(matches!(route, Route::Resource { .. }));
        assert!(RoutingConvention::new("x", "X").validate().is_err());
    }
}
