/// Animation curves and their key/frame storage
pub mod anim_curve;
/// Embedded files
pub mod external_file;
/// GPU memory pool and buffer descriptors
pub mod memory_pool;
/// `FMDL` models
pub mod model;
/// The archive root
pub mod res_file;
/// Sections kept as names and offsets
pub mod section;
/// `FSKA` skeletal animations
pub mod skeletal_anim;
/// `FSKL` skeletons and bones
pub mod skeleton;
/// User data attached to records
pub mod user_data;
