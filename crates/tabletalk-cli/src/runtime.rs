// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use tabletalk_app::{RemoteEvent, ResultSet};
use tabletalk_session::{Channel, ClientCommand, Session};

/// Adapts a [`Session`] over any channel to the surface the UI drives.
pub struct ChannelRuntime<C> {
    session: Session<C>,
}

impl<C: Channel> ChannelRuntime<C> {
    pub fn new(session: Session<C>) -> Self {
        Self { session }
    }
}

impl<C: Channel> tabletalk_tui::SessionRuntime for ChannelRuntime<C> {
    fn send_chat(&mut self, text: &str) -> Result<()> {
        self.session.send(&ClientCommand::UserInput(text.to_owned()))
    }

    fn request_schema_context(&mut self) -> Result<()> {
        self.session.send(&ClientCommand::GetSchemaContext)
    }

    fn commit_schema_context(&mut self, tables: &[String]) -> Result<()> {
        self.session
            .send(&ClientCommand::SchemaContextUpdate(tables.to_vec()))
    }

    fn poll_remote(&mut self) -> Vec<RemoteEvent> {
        self.session.pump()
    }

    fn apply_pending_result(&mut self) -> bool {
        self.session.apply_pending_result()
    }

    fn result_set(&self) -> &ResultSet {
        self.session.result_set()
    }
}
