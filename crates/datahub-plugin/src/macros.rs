//! Convenience macros for plugin development.

/// Builds a [`PluginInfo`](crate::registry::PluginInfo).
///
/// # Example
/// ```rust,ignore
/// let info = plugin_info!(
///     name: "activity",
///     version: "1.0.0",
///     description: "Dataset activity streams",
///     author: "DataHub Team"
/// );
/// ```
#[macro_export]
macro_rules! plugin_info {
    (
        name: $name:expr,
        version: $version:expr,
        description: $desc:expr,
        author: $author:expr $(,)?
    ) => {
        $crate::registry::PluginInfo {
            name: $name.to_string(),
            version: $version.to_string(),
            description: $desc.to_string(),
            author: $author.to_string(),
        }
    };
}

/// Builds a [`Payload`](crate::context::Payload) from key/value pairs.
///
/// # Example
/// ```rust,ignore
/// let payload = payload!({
///     "id" => json!("ds-1"),
///     "limit" => json!(10),
/// });
/// ```
#[macro_export]
macro_rules! payload {
    () => {
        $crate::context::Payload::new()
    };
    ({ $($key:expr => $value:expr),* $(,)? }) => {{
        let mut payload = $crate::context::Payload::new();
        $(
            payload.insert($key.to_string(), $crate::serde_json::Value::from($value));
        )*
        payload
    }};
}
