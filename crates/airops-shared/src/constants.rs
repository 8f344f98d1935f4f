/// Inbound: a message was created in a conversation the user belongs to.
pub const EVENT_MESSAGE_NEW: &str = "message:new";

/// Inbound: a counterpart read a message.
/// Outbound: the local user read a message.
pub const EVENT_MESSAGE_READ: &str = "message:read";

/// Inbound: someone started or stopped composing.
pub const EVENT_USER_TYPING: &str = "user:typing";

pub const EVENT_USER_ONLINE: &str = "user:online";
pub const EVENT_USER_OFFLINE: &str = "user:offline";

pub const EVENT_REACTION_ADDED: &str = "message:reaction:added";
pub const EVENT_REACTION_REMOVED: &str = "message:reaction:removed";

pub const EVENT_EMERGENCY_ALERT: &str = "emergency:alert";

/// Outbound: join the rooms of the given conversations.
pub const EVENT_CONVERSATIONS_JOIN: &str = "conversations:join";
pub const EVENT_TYPING_START: &str = "typing:start";
pub const EVENT_TYPING_STOP: &str = "typing:stop";

/// Reserved Socket.IO lifecycle names, delivered to local subscribers only.
pub const EVENT_CONNECT: &str = "connect";
pub const EVENT_DISCONNECT: &str = "disconnect";
pub const EVENT_CONNECT_ERROR: &str = "connect_error";

/// Default Socket.IO mount path on the messaging backend.
pub const DEFAULT_SOCKET_PATH: &str = "/socket.io/";

/// Engine.IO protocol revision spoken by the backend.
pub const ENGINE_IO_VERSION: u8 = 4;

/// Characters kept when deriving a conversation preview from message content.
pub const DEFAULT_PREVIEW_CHARS: usize = 100;

/// Idle window after which a typing flag without a matching stop is dropped.
pub const DEFAULT_TYPING_EXPIRY_SECS: u64 = 8;
