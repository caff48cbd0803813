pub mod iteration;
pub mod work_item;
