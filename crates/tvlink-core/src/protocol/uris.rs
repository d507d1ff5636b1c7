//! Service URIs addressed on the main channel.

/// Foreground application changes (subscription; payload `appId`).
pub const FOREGROUND_APP: &str = "ssap://com.webos.applicationManager/getForegroundAppInfo";

/// Volume and mute changes (subscription; payload `volume`/`muted`).
pub const VOLUME: &str = "ssap://audio/getVolume";

/// Remote-control button press (payload `name`).
pub const SEND_BUTTON: &str = "ssap://com.webos.service.networkinput/sendButton";

/// Text injection into the focused input field (payload `text`, `replace`).
pub const INSERT_TEXT: &str = "ssap://com.webos.service.ime/insertText";

/// Session-scoped pointer socket handle (answer payload `socketPath`).
pub const POINTER_SOCKET: &str = "ssap://com.webos.service.networkinput/getPointerInputSocket";
