//! ddrop-sync: drop lifecycle engine
//!
//! - `sender`: files → bundle → encrypted chunks → presigned uploads → manifest → finalize
//! - `receiver`: short code → manifest → verified, decrypted, ordered assembly → pickup report
//! - `burn`: burn-after-read countdown and explicit burns
//! - `manifest`: manifest assembly and backend response checks
//! - `engine`: options, phase observers, progress and cancellation

pub mod burn;
pub mod engine;
pub mod manifest;
pub mod receiver;
pub mod sender;

pub use burn::{burn_now, complete_burn, schedule_burn, BurnCountdown, BURN_AFTER_READ_REASON};
pub use engine::{
    Hooks, PhaseFn, ProgressFn, ReceiveHooks, ReceiveOptions, SendHooks, SendOptions,
};
pub use receiver::{
    download_drop, load_manifest, pickup_drop, report_pickup, resolve, sanitize_filename,
    DownloadResult, PickupArgs, PickupOutcome,
};
pub use sender::{send_drop, SendResult};
