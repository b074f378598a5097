use crate::types::ConnectionState;
use std::fmt;

/// Connection health as shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    ConnectedPush,
    ConnectedPoll,
    Disconnected,
}

impl Status {
    pub fn label(&self) -> &'static str {
        match self {
            Status::ConnectedPush => "SSE Conectado",
            Status::ConnectedPoll => "HTTP Polling",
            Status::Disconnected => "Desconectado",
        }
    }

    /// Transport name for the view footer.
    pub fn method(&self) -> &'static str {
        match self {
            Status::ConnectedPush => "Server-Sent Events",
            Status::ConnectedPoll => "HTTP Polling",
            Status::Disconnected => "Desconectado",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A push handshake still in flight is not a connection yet.
pub fn project(state: ConnectionState) -> Status {
    match state {
        ConnectionState::PushActive => Status::ConnectedPush,
        ConnectionState::PollActive => Status::ConnectedPoll,
        ConnectionState::Disconnected | ConnectionState::ConnectingPush => Status::Disconnected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projects_every_state() {
        assert_eq!(project(ConnectionState::PushActive).label(), "SSE Conectado");
        assert_eq!(project(ConnectionState::PollActive).label(), "HTTP Polling");
        assert_eq!(project(ConnectionState::Disconnected).label(), "Desconectado");
        assert_eq!(project(ConnectionState::ConnectingPush).label(), "Desconectado");
    }

    #[test]
    fn method_names_the_transport() {
        assert_eq!(Status::ConnectedPush.method(), "Server-Sent Events");
        assert_eq!(Status::ConnectedPoll.method(), "HTTP Polling");
        assert_eq!(Status::Disconnected.method(), "Desconectado");
    }
}
