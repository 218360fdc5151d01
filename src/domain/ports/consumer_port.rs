//! Port definitions for the UI elements that display images.

use crate::domain::entities::SharedImage;

/// A display target, such as an image view in a list row.
pub trait ImageTarget: Send + Sync {
    /// Shows `image`. Called on the delivery context only.
    fn set_image(&self, image: SharedImage);
}

/// A progress spinner attached to a request.
pub trait ProgressIndicator: Send + Sync {
    /// Shows or hides the indicator.
    fn set_visible(&self, visible: bool);
}
