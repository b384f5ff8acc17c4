//! Reserved route ids.
//!
//! Route ids are allocated per process and are never reused while an
//! endpoint is registered under them. Only route 0 is reserved.

/// Channel-level traffic: hello, route-id requests, modal dialog signals.
pub const CONTROL_ROUTE: u32 = 0;

/// First id handed out for object endpoints.
pub const FIRST_OBJECT_ROUTE: u32 = 1;

/// Returns a short label for a route id, for logs.
pub fn route_label(route: u32) -> &'static str {
    match route {
        CONTROL_ROUTE => "CONTROL",
        _ => "OBJECT",
    }
}

/// Returns true if the route is the channel's own control route.
pub fn is_control(route: u32) -> bool {
    route == CONTROL_ROUTE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels() {
        assert_eq!(route_label(0), "CONTROL");
        assert_eq!(route_label(FIRST_OBJECT_ROUTE), "OBJECT");
        assert!(is_control(CONTROL_ROUTE));
        assert!(!is_control(42));
    }
}
