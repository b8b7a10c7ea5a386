#![deny(unsafe_code)]

/// Embeddable chat widget core.
///
/// The conversation controller, markdown renderer and host contracts live in [`chat`];
/// transport to the chat service is provided by `sitechat-transport`.
pub mod chat;
/// Layered widget settings persisted under the user config directory.
pub mod settings;
pub mod telemetry;
