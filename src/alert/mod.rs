pub mod fanout;
pub mod render;

pub use fanout::AlertFanout;
pub use render::render_alert;
