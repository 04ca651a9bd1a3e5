pub mod attachment;
pub mod board;
pub mod menu;
pub mod menu_content;
pub mod popup;
pub mod post;

pub use attachment::{Entity as Attachment, FileType, Model as AttachmentModel};
pub use board::{BoardType, Entity as Board, Model as BoardModel};
pub use menu::{Entity as Menu, MenuType, Model as MenuModel};
pub use menu_content::{Entity as MenuContent, Model as MenuContentModel};
pub use popup::{Entity as Popup, Model as PopupModel};
pub use post::{Entity as Post, Model as PostModel};
