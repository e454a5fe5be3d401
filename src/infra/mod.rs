// Infrastructure adapters implementing the application ports.
pub mod index_service;
pub mod pacer_client;

pub use index_service::ReqwestIndexService;
pub use pacer_client::ReqwestPacerClient;
