//! Shared UI icons and emojis.
//!
//! Each icon has a plain-text fallback for terminals without emoji support.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[WARN]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");

// Stage indicators
pub static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[SCAN]");
pub static FILE_NEW: Emoji<'_, '_> = Emoji("📄 ", "+");
pub static FILE_MOD: Emoji<'_, '_> = Emoji("📝 ", "~");
pub static BRANCH: Emoji<'_, '_> = Emoji("🌿 ", "[BRANCH]");
pub static UPLOAD: Emoji<'_, '_> = Emoji("📤 ", "[PUB]");
pub static LINK: Emoji<'_, '_> = Emoji("🔗 ", "[PR]");
