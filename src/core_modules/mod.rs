pub mod background_model;
pub mod blob;
pub mod blob_extractor;
pub mod blob_pool;
pub mod cell_pool;
pub mod density_scanner;
pub mod frame;
pub mod pixel;
pub mod render;
