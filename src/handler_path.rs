/// A runtime handler name split into its package path and handler parts.
///
/// Runtime names follow the `<pkg>/<path>.<Func>` convention, with methods
/// rendered as `<pkg>.(*Recv).Method` and bound methods carrying a trailing
/// `-fm` marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerPath {
    path_parts: Vec<String>,
    handler_parts: Vec<String>,
}

pub fn split_handler_path(handler_path: &str) -> HandlerPath {
    let mut path_parts: Vec<String> = handler_path.split('/').map(|s| s.to_string()).collect();

    let last = path_parts.pop().unwrap_or_default();
    let mut handler_parts: Vec<String> = last.split('.').map(|s| s.to_string()).collect();

    path_parts.push(handler_parts.remove(0));

    HandlerPath {
        path_parts,
        handler_parts,
    }
}

impl HandlerPath {
    pub fn package_path(&self) -> String {
        self.path_parts.join("/")
    }

    pub fn package_name(&self) -> &str {
        self.path_parts.last().map(|s| s.as_str()).unwrap_or("")
    }

    pub fn handler(&self) -> String {
        self.handler_parts.join(".")
    }

    /// The function name, handling both regular functions and methods.
    /// `main.GetPosts` yields `GetPosts`; `main.(*APIServer).GetContacts-fm`
    /// yields `GetContacts`.
    pub fn func_name(&self) -> &str {
        match self.handler_parts.last() {
            Some(name) => name.trim_end_matches("-fm"),
            None => "",
        }
    }

    /// Whether this is a method-style handler (has a receiver).
    pub fn is_method(&self) -> bool {
        if self.handler_parts.len() < 2 {
            return false;
        }
        let first = &self.handler_parts[0];
        first.starts_with('(') && first.ends_with(')')
    }

    /// The receiver type for method-style handlers, e.g. `*APIServer`.
    pub fn receiver_type(&self) -> &str {
        if !self.is_method() {
            return "";
        }
        self.handler_parts[0]
            .trim_start_matches('(')
            .trim_end_matches(')')
    }

    /// The receiver type name without the pointer asterisk.
    pub fn receiver_type_name(&self) -> &str {
        self.receiver_type().trim_start_matches('*')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_function() {
        let split = split_handler_path("main.GetPosts");
        assert_eq!(split.package_path(), "main");
        assert_eq!(split.package_name(), "main");
        assert_eq!(split.handler(), "GetPosts");
        assert_eq!(split.func_name(), "GetPosts");
        assert!(!split.is_method());
    }

    #[test]
    fn test_nested_package() {
        let split = split_handler_path("example.com/demo/handlers.ListUsers");
        assert_eq!(split.package_path(), "example.com/demo/handlers");
        assert_eq!(split.package_name(), "handlers");
        assert_eq!(split.func_name(), "ListUsers");
    }

    #[test]
    fn test_bound_method() {
        let split = split_handler_path("main.(*APIServer).GetContacts-fm");
        assert_eq!(split.package_path(), "main");
        assert!(split.is_method());
        assert_eq!(split.receiver_type(), "*APIServer");
        assert_eq!(split.receiver_type_name(), "APIServer");
        assert_eq!(split.func_name(), "GetContacts");
    }

    #[test]
    fn test_value_receiver_method() {
        let split = split_handler_path("example.com/demo/api.(Server).Health");
        assert!(split.is_method());
        assert_eq!(split.receiver_type(), "Server");
        assert_eq!(split.receiver_type_name(), "Server");
        assert_eq!(split.func_name(), "Health");
    }
}
