pub mod element;
pub mod inspector;
pub mod tab_order;
pub mod text;

pub use element::{ElementDescriptor, RawElement, SelectOption, TagKind};
pub use inspector::ElementInspector;
pub use tab_order::{fill_by_position, TabOrderField, TabOrderMap, TabOrderMapper};
pub use text::{page_excerpt, visible_text};
