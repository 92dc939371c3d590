#![allow(dead_code)]

pub const SEND_EMAIL: &str = "send-email";
pub const RESIZE_IMAGE: &str = "resize-image";
pub const DEFAULT_QUEUE: &str = "default";

/// Tolerance when comparing averages computed by different strategies.
pub const EPSILON: f64 = 1e-9;
