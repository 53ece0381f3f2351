// Macros to simplify attribute and graph declarations

/// Builds an [`Attributes`](crate::graph::Attributes) map from `name => value` pairs.
#[macro_export]
macro_rules! attrs {
    () => {
        $crate::graph::Attributes::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut attributes = $crate::graph::Attributes::new();
        $(
            attributes.insert(
                ::std::string::String::from($name),
                $crate::graph::Value::from($value),
            );
        )+
        attributes
    }};
}
