use std::path::PathBuf;
use std::sync::Arc;

use crate::service::ChallengeService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub service: ChallengeService,
    /// Where uploaded images are written; served at `/uploads`.
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}
