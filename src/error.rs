use thiserror::Error;

pub type Result<T> = std::result::Result<T, StrataError>;

/// Configuration errors raised while building or reading a container.
///
/// These are programmer errors: the request pipeline never catches them.
#[derive(Debug, Error)]
pub enum StrataError {
    #[error("No provider for {key}{} on injector {injector}", requested_by_suffix(.requested_by))]
    NoProvider {
        key: String,
        requested_by: Option<String>,
        injector: String,
    },

    #[error("Invalid provider for {key}: neither use_class nor use_value is set")]
    InvalidProvider { key: String },

    #[error("Failed to downcast {key} to {expected}")]
    DowncastFailed { key: String, expected: String },

    #[error("Missing constructor argument #{position} for {class}")]
    MissingArgument { class: String, position: usize },

    #[error("Unknown injected property `{property}` on {class}")]
    UnknownProperty { class: String, property: String },

    #[error("Injector {injector} has been destroyed")]
    Destroyed { injector: String },
}

fn requested_by_suffix(requested_by: &Option<String>) -> String {
    match requested_by {
        Some(class) => format!(" (requested by {class})"),
        None => String::new(),
    }
}
