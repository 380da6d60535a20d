mod form;
mod images;
mod upload;

pub use form::{redirect_to_root, serve_form, serve_icon};
pub use images::serve_image;
pub use upload::{upload_image, upload_method_not_allowed, IMAGES_PATH, IMAGE_FIELD};
