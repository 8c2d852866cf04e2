use proc_macro::TokenStream;

mod injectable;

/// Derive macro generating the `Injectable` descriptor table of a struct.
///
/// Field attributes:
/// - `#[inject]`: constructor injection keyed by the field's type
///   (`Arc<T>` resolves `T`, `Arc<dyn Trait>` a trait binding, any other type
///   is cloned out of the container)
/// - `#[inject(token = "name")]`: constructor injection keyed by a token
/// - `#[inject(property)]`: property injection into a `Property<T>` or
///   `MutableProperty<T>`, combinable with `token`
///
/// Fields without `#[inject]` start from `Default::default()`.
///
/// Struct attribute `#[injectable(providers(A, B), after_construct)]` declares
/// class providers for the resolving scope and forwards the post-construct
/// hook to the type's `AfterConstruct` impl.
///
/// # Example
/// ```ignore
/// use strata::{Injectable, Property};
///
/// #[derive(Injectable)]
/// #[injectable(providers(Database), after_construct)]
/// pub struct UserService {
///     #[inject]
///     database: Arc<Database>,
///     #[inject(token = "tenant", property)]
///     tenant: Property<String>,
/// }
/// ```
#[proc_macro_derive(Injectable, attributes(inject, injectable))]
pub fn derive_injectable(input: TokenStream) -> TokenStream {
    injectable::derive_injectable(input)
}
