//! Events the CDP Tab Client forwards to its subscribers (step-flow's
//! console/network capture, and the Run Coordinator's dialog handling).

use serde::{Deserialize, Serialize};

use super::ids::PageId;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum RawEvent {
    PageNavigated {
        page: PageId,
        url: String,
        ts: u64,
    },
    Console {
        page: PageId,
        level: String,
        text: String,
        ts: u64,
    },
    NetworkResponse {
        page: PageId,
        url: String,
        method: String,
        status: Option<u16>,
        mocked: bool,
        ts: u64,
    },
    /// `window.alert`/`confirm`/`prompt`/`beforeunload` fired and is
    /// blocking the renderer until `Page.handleJavaScriptDialog` resolves it.
    JavascriptDialogOpening {
        page: PageId,
        message: String,
        dialog_type: String,
    },
    Error {
        page: Option<PageId>,
        message: String,
    },
}
