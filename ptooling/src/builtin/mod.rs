//! The tools offered to the model, each bound to one external collaborator.
//!
//! Media tools are [`ToolGate::Metered`](crate::ToolGate) and only run after
//! the dispatcher has authorized them; search and reminders are free.

mod image;
mod notification;
mod search;
mod try_on;
mod video;

pub use image::{GenerateImageTool, ImageGenerator, MAX_IMAGES_PER_CALL};
pub use notification::{
    AddNotificationTool, InMemoryNotificationStore, NotificationError, NotificationStore,
};
pub use search::{SearchWebTool, WebSearch};
pub use try_on::{GarmentType, TryOnGarmentTool, TryOnProvider};
pub use video::{GenerateVideoTool, GeneratedVideo, VideoGenerator};
