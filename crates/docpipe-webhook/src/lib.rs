//! Webhook dispatch engine (spec §4.6): template rendering, HMAC
//! signing, auth modes, and two delivery targets (generic HTTP,
//! Kingdee K3 Cloud ERP session), plus the retry-delay curve the
//! orchestrator's push worker drives.

mod dispatch;
mod erp;
mod generic;
mod retry;
mod signing;
mod template;

pub use dispatch::{dispatch, DispatchOutcome};
pub use erp::{ErpClient, ErpResult};
pub use generic::{push as push_generic, AuthCredential, PushOutcome};
pub use retry::{next_delay, should_retry};
pub use signing::sign;
pub use template::{render as render_template, TemplateContext};
