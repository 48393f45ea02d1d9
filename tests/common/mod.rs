#![allow(dead_code)]

use std::time::Duration;

pub const SHORT_PAUSE: Duration = Duration::from_millis(50);
pub const SETTLE: Duration = Duration::from_millis(150);
pub const LONG_TIMEOUT: Duration = Duration::from_secs(5);
pub const ITEMS_MEDIUM: usize = 200;
pub const ITEMS_HIGH: usize = 1000;
