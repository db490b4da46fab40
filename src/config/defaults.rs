//! Default values for configuration fields

use std::time::Duration;

pub fn default_max_channels() -> usize {
    100
}

pub fn default_min_channel_number() -> u16 {
    1
}

pub fn default_max_channel_number() -> u16 {
    999
}

pub fn default_setup_max_channels() -> usize {
    25
}

pub fn default_min_items_per_channel() -> usize {
    3
}

pub fn default_library_scan_limit() -> usize {
    500
}

pub fn default_content_cache_ttl() -> Duration {
    Duration::from_secs(3600)
}

pub fn default_show_decoration_ttl() -> Duration {
    Duration::from_secs(300)
}

pub fn default_retry_delay() -> Duration {
    Duration::from_secs(30)
}

pub fn default_sync_interval() -> Duration {
    Duration::from_secs(1)
}

pub fn default_drift_tolerance() -> Duration {
    Duration::from_secs(5)
}

pub fn default_min_boundary_timer() -> Duration {
    Duration::from_millis(250)
}

pub fn default_max_boundary_timer() -> Duration {
    Duration::from_secs(3600)
}
