use proc_macro::TokenStream;
use quote::quote;
use syn::{
    parse_macro_input, Data, DeriveInput, ImplItem, ImplItemFn, ItemImpl, LitStr, Stmt,
    Variant, Visibility,
};

/// Procedural macro that enhances error enums with generic error handling
///
/// This macro automatically:
/// 1. Adds `#[derive(Debug, thiserror::Error)]`
/// 2. Adds a `Generic { message: String }` variant if not already present
/// 3. Implements `From<anyhow::Error>` for the error type, flattening the cause chain
/// 4. Provides helper methods for converting `anyhow::Result`s
///
/// # Usage
///
/// ```rust,ignore
/// #[migrate_error]
/// pub enum StorageError {
///     #[error("Bucket {id} not found")]
///     BucketNotFound { id: String },
/// }
/// ```
#[proc_macro_attribute]
pub fn migrate_error(_args: TokenStream, input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let Data::Enum(data_enum) = &input.data else {
        return syn::Error::new_spanned(&input, "migrate_error can only be applied to enums")
            .to_compile_error()
            .into();
    };

    let enum_name = &input.ident;
    let visibility = &input.vis;
    let generics = &input.generics;

    // Existing derives are replaced by ours
    let attrs: Vec<_> = input
        .attrs
        .iter()
        .filter(|attr| !attr.path().is_ident("derive"))
        .collect();

    let mut variants = data_enum.variants.clone();
    if !variants.iter().any(|variant| variant.ident == "Generic") {
        let generic_variant: Variant = syn::parse_quote! {
            /// A generic error that wraps an `anyhow` error chain.
            #[error("Generic error: {message}")]
            Generic {
                /// The flattened error chain.
                message: String
            }
        };
        variants.push(generic_variant);
    }

    let expanded = quote! {
        #[derive(Debug, thiserror::Error)]
        #(#attrs)*
        #visibility enum #enum_name #generics {
            #variants
        }

        impl #generics From<anyhow::Error> for #enum_name #generics {
            fn from(err: anyhow::Error) -> Self {
                Self::Generic {
                    message: {
                        let mut message = err.to_string();
                        let chain: Vec<String> = err.chain().skip(1).map(|e| e.to_string()).collect();
                        if !chain.is_empty() {
                            message.push_str(" (caused by: ");
                            message.push_str(&chain.join(" -> "));
                            message.push(')');
                        }
                        message
                    }
                }
            }
        }

        impl #generics #enum_name #generics {
            /// Convert an `anyhow::Result` to a `Result` with this error type
            pub fn from_anyhow_result<T>(result: anyhow::Result<T>) -> Result<T, Self> {
                result.map_err(Self::from)
            }

            /// Convert an `anyhow::Result` to a `Result` with this error type, adding a prefix
            pub fn from_anyhow_result_with_prefix<T>(
                result: anyhow::Result<T>,
                prefix: &str,
            ) -> Result<T, Self> {
                result.map_err(|err| match Self::from(err) {
                    Self::Generic { message } => Self::Generic {
                        message: format!("{}: {}", prefix, message),
                    },
                    other => other,
                })
            }
        }
    };

    TokenStream::from(expanded)
}

/// Injects a scoped logging context into every `pub fn` of an impl block.
///
/// The scope defaults to the type name of the impl block and can be overridden
/// with a string literal: `#[log_context("Secrets")]`.
///
/// ```rust,ignore
/// #[log_context]
/// impl MigrationOrchestrator {
///     pub async fn run(&self) -> Result<(), MigrateError> {
///         // `_migrate_log_ctx` is injected here
///         info!("prefixed with [Migrate][MigrationOrchestrator]");
///         Ok(())
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn log_context(args: TokenStream, input: TokenStream) -> TokenStream {
    let scope = if args.is_empty() {
        None
    } else {
        Some(parse_macro_input!(args as LitStr).value())
    };
    let input_impl = parse_macro_input!(input as ItemImpl);

    let scope = scope.unwrap_or_else(|| impl_type_name(&input_impl));

    let items = input_impl
        .items
        .iter()
        .map(|item| match item {
            ImplItem::Fn(method) if matches!(method.vis, Visibility::Public(_)) => {
                let mut method = method.clone();
                inject_logging_context(&mut method, &scope);
                ImplItem::Fn(method)
            }
            other => other.clone(),
        })
        .collect();

    let new_impl = ItemImpl {
        items,
        ..input_impl
    };

    quote! { #new_impl }.into()
}

fn impl_type_name(input_impl: &ItemImpl) -> String {
    match &*input_impl.self_ty {
        syn::Type::Path(type_path) => type_path
            .path
            .segments
            .last()
            .map_or_else(|| "Unknown".to_string(), |segment| segment.ident.to_string()),
        _ => "Unknown".to_string(),
    }
}

fn inject_logging_context(method: &mut ImplItemFn, scope: &str) {
    let context_stmt: Stmt = syn::parse_quote! {
        let _migrate_log_ctx = crate::primitives::logger::LogContext::new(#scope);
    };
    method.block.stmts.insert(0, context_stmt);
}
