pub mod client;
pub mod generator;
pub mod upload;

pub use client::{
    AbstractedFontRecord, AbstractedVariantRecord, CreateAbstractedFontRequest, GraphqlClient,
    HostedDomainRecord, HostedFontRecord, HostedVariantRecord, IdRef, RemoteError,
};
pub use generator::GeneratorClient;
pub use upload::{UploadClient, UploadedFile};
