//! Service layer: pipelines that span stores and external collaborators.

pub mod commentary_service;
pub mod documentation;
pub mod feed_service;
pub mod transcode_worker;
