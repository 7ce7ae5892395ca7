//! Chromium (CDP) によるブラウザセッション

mod fingerprint;
mod session;

pub use fingerprint::Fingerprint;
pub use session::{ChromiumElement, ChromiumSession};
