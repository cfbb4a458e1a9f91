pub mod path;
pub mod title;

pub use path::{
    ensure_within, file_name_string, file_stem_string, has_hidden_component, is_hidden,
    next_free_sibling, normalize_path, os_path_to_string, to_anchor,
    validate_name,
};
pub use title::TitleKey;
