pub mod args;
pub mod html;
pub mod window;
