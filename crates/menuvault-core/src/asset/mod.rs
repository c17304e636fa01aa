//! Asset transfer client.
//!
//! Moves image files referenced by entities from the local uploads directory
//! to the remote content store, skipping references that are already remote.

mod transfer;
mod types;
mod uploader;

pub use transfer::AssetTransfer;
pub use types::{
    IdentifierStrategy, RemoteDescriptor, TransferPlan, TransferSettings, TransformPolicy,
    UploadOptions,
};
pub use uploader::{AssetUploader, CloudinaryCredentials, CloudinaryUploader};
