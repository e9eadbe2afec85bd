// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::model::SchemaTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppMode {
    #[default]
    Nav,
    ChatInput,
    Search,
    Picker,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Connecting,
    Connected,
    Closed(String),
}

impl ConnectionState {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppState {
    pub mode: AppMode,
    pub connection: ConnectionState,
    pub status_line: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    EnterChatInput,
    EnterSearch,
    OpenPicker,
    ClosePicker,
    ExitToNav,
    MarkConnected,
    MarkClosed(String),
    SetStatus(String),
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    ModeChanged(AppMode),
    ConnectionChanged(ConnectionState),
    StatusUpdated(String),
    StatusCleared,
}

impl AppState {
    pub fn dispatch(&mut self, command: AppCommand) -> Vec<AppEvent> {
        match command {
            AppCommand::EnterChatInput => self.set_mode(AppMode::ChatInput),
            AppCommand::EnterSearch => self.set_mode(AppMode::Search),
            AppCommand::OpenPicker => self.set_mode(AppMode::Picker),
            AppCommand::ClosePicker | AppCommand::ExitToNav => self.set_mode(AppMode::Nav),
            AppCommand::MarkConnected => {
                self.connection = ConnectionState::Connected;
                vec![
                    AppEvent::ConnectionChanged(self.connection.clone()),
                    self.set_status("connected"),
                ]
            }
            AppCommand::MarkClosed(reason) => {
                // Terminal for the session; there is no reconnect path.
                self.connection = ConnectionState::Closed(reason);
                vec![AppEvent::ConnectionChanged(self.connection.clone())]
            }
            AppCommand::SetStatus(message) => vec![self.set_status(&message)],
            AppCommand::ClearStatus => {
                self.status_line = None;
                vec![AppEvent::StatusCleared]
            }
        }
    }

    fn set_mode(&mut self, mode: AppMode) -> Vec<AppEvent> {
        self.mode = mode;
        vec![AppEvent::ModeChanged(self.mode)]
    }

    fn set_status(&mut self, message: &str) -> AppEvent {
        self.status_line = Some(message.to_owned());
        AppEvent::StatusUpdated(message.to_owned())
    }
}

/// What the session router hands the UI after classifying one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEvent {
    Connected,
    /// A chat reply. When `carries_result` is set, a staged result-set
    /// replacement follows once the caller applies it; otherwise the staged
    /// update clears the table.
    Reply {
        text: String,
        carries_result: bool,
    },
    SchemaSnapshot {
        tables: Vec<SchemaTable>,
        selected: Vec<String>,
    },
    SelectionConfirmed {
        tables: Vec<String>,
    },
    /// A frame that failed to parse was dropped; the session continues.
    FrameDropped {
        detail: String,
    },
    Closed {
        reason: String,
    },
}
