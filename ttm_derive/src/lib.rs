use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident, LitStr, Type, parse_macro_input, spanned::Spanned};

/// Generates `ttm::entity::Entity` from a struct's fields.
///
/// ```ignore
/// #[derive(Debug, Clone, Default, Entity)]
/// #[entity(name = "inventory.model.Widget")]
/// struct Widget {
///     #[field(id, include)]
///     id: i64,
///     #[field(include)]
///     name: String,
///     secret: String,
///     #[field(skip)]
///     scratch: Vec<u8>,
/// }
/// ```
///
/// Field options: `id` (the scalar `i64` identity), `include` (projected into
/// outbound records), `read_only` (inbound records can't set it) and `skip`
/// (no descriptor at all).
#[proc_macro_derive(Entity, attributes(entity, field))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_entity(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Default)]
struct FieldOptions {
    id: bool,
    include: bool,
    read_only: bool,
    skip: bool,
}

struct EntityField {
    ident: Ident,
    ty: Type,
    options: FieldOptions,
}

fn expand_entity(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            input.generics,
            "Entity can't be derived for generic structs",
        ));
    }

    let type_name = parse_entity_name(&input.attrs)?.unwrap_or_else(|| struct_name.to_string());

    let Data::Struct(data_struct) = input.data else {
        return Err(syn::Error::new(
            struct_name.span(),
            "Entity can only be derived for structs",
        ));
    };
    let Fields::Named(named_fields) = data_struct.fields else {
        return Err(syn::Error::new(
            struct_name.span(),
            "Entity requires named fields",
        ));
    };

    let mut fields = Vec::<EntityField>::new();
    for field in named_fields.named {
        let span = field.span();
        let ident = field
            .ident
            .ok_or_else(|| syn::Error::new(span, "Entity requires named fields"))?;
        let options = parse_field_options(&field.attrs)?;
        fields.push(EntityField {
            ident,
            ty: field.ty,
            options,
        });
    }

    let mut id_fields = fields.iter().filter(|field| field.options.id);
    let Some(id_field) = id_fields.next() else {
        return Err(syn::Error::new(
            struct_name.span(),
            "Entity requires one #[field(id)] field of type i64",
        ));
    };
    if let Some(extra) = id_fields.next() {
        return Err(syn::Error::new(
            extra.ident.span(),
            "Only one field can be marked #[field(id)]",
        ));
    }
    let id_ident = &id_field.ident;

    let descriptors = fields
        .iter()
        .filter(|field| !field.options.skip)
        .map(descriptor_tokens);

    Ok(quote! {
        impl ::ttm::entity::Entity for #struct_name {
            fn type_name() -> &'static str {
                #type_name
            }

            fn descriptors() -> ::std::vec::Vec<::ttm::entity::FieldDescriptor<Self>> {
                ::std::vec![#(#descriptors),*]
            }

            fn identity(&self) -> ::ttm::entity::EntityId {
                ::ttm::entity::EntityId::Scalar(self.#id_ident)
            }

            fn assign_identity(&mut self, id: ::ttm::entity::EntityId) -> ::ttm::core::Result<()> {
                ::ttm::entity::assign_scalar_identity(&mut self.#id_ident, id)
            }
        }
    })
}

fn descriptor_tokens(field: &EntityField) -> TokenStream2 {
    let ident = &field.ident;
    let ty = &field.ty;
    let name = ident.to_string().trim_start_matches("r#").to_string();

    let mut chain = Vec::<TokenStream2>::new();
    if field.options.include {
        chain.push(quote!(.include()));
    }
    if field.options.id {
        chain.push(quote!(.identity()));
    }
    if field.options.read_only {
        chain.push(quote!(.read_only()));
    }

    quote! {
        ::ttm::entity::FieldDescriptor::of::<#ty>(
            #name,
            |entity: &Self| <#ty as ::ttm::entity::FieldValue>::to_value(&entity.#ident),
            |entity: &mut Self, value: ::ttm::core::Value| -> ::ttm::core::Result<()> {
                entity.#ident = <#ty as ::ttm::entity::FieldValue>::from_value(value)?;
                Ok(())
            },
        ) #(#chain)*
    }
}

fn parse_entity_name(attrs: &[syn::Attribute]) -> syn::Result<Option<String>> {
    let mut name = None;
    for attr in attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value = meta.value()?;
                let lit: LitStr = value.parse()?;
                if lit.value().trim().is_empty() {
                    return Err(syn::Error::new(lit.span(), "Entity name can't be empty"));
                }
                name = Some(lit.value());
                return Ok(());
            }

            Err(meta.error("Unsupported #[entity(...)] option. Supported: name = \"...\""))
        })?;
    }
    Ok(name)
}

fn parse_field_options(attrs: &[syn::Attribute]) -> syn::Result<FieldOptions> {
    let mut options = FieldOptions::default();

    for attr in attrs {
        if !attr.path().is_ident("field") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("id") {
                options.id = true;
            } else if meta.path.is_ident("include") {
                options.include = true;
            } else if meta.path.is_ident("read_only") {
                options.read_only = true;
            } else if meta.path.is_ident("skip") {
                options.skip = true;
            } else {
                return Err(meta.error(
                    "Unsupported #[field(...)] option. Supported: id, include, read_only, skip",
                ));
            }
            Ok(())
        })?;

        if options.skip && (options.id || options.include || options.read_only) {
            return Err(syn::Error::new(
                attr.span(),
                "#[field(skip)] cannot be combined with other field options",
            ));
        }
    }

    Ok(options)
}
