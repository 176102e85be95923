pub mod group;
pub mod link;
pub mod site;

pub use group::*;
pub use link::*;
pub use site::*;

// Trend markers used in diff reports
pub const EMOJI_UP: &str = "🔺";
pub const EMOJI_DOWN: &str = "🔻";
pub const EMOJI_FLAT: &str = "➖";
pub const EMOJI_HOURGLASS: &str = "⏳";
pub const EMOJI_CHECK: &str = "✅";
