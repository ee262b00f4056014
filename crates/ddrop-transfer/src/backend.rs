//! The backend collaborator: presigns URLs and owns the drop records

use async_trait::async_trait;
use ddrop_core::api::{
    BurnRequest, BurnResponse, DropResponse, FinalizeRequest, FinalizeResponse, PickupRequest,
    PresignRequest, PresignResponse, ShortCodeResponse,
};
use ddrop_core::{DropResult, ShortCode};

#[async_trait]
pub trait DropBackend: Send + Sync {
    /// `POST /api/presign`: one upload target per chunk plus the manifest
    async fn presign(&self, req: &PresignRequest) -> DropResult<PresignResponse>;

    /// `POST /api/drops`: mark the drop ready and allocate its short code
    async fn finalize(&self, req: &FinalizeRequest) -> DropResult<FinalizeResponse>;

    /// `GET /api/short/{code}`; unknown codes are `NotFound`
    async fn resolve_short_code(&self, code: &ShortCode) -> DropResult<ShortCodeResponse>;

    /// `GET /api/drops/{id}`; `NotFound`, or `NotReady` until finalized
    async fn get_drop(&self, drop_id: &str) -> DropResult<DropResponse>;

    /// `POST /api/drops/{id}/pickup`
    async fn log_pickup(&self, drop_id: &str, req: &PickupRequest) -> DropResult<()>;

    /// `POST /api/drops/{id}/burn`
    async fn burn_drop(&self, drop_id: &str, req: &BurnRequest) -> DropResult<BurnResponse>;
}
