pub mod archive;
pub mod backup_set;
pub mod catalog;
pub mod result_error;
pub mod rotation;
pub mod validate;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
