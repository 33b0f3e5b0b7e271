//! Pairwise ratchet chats on top of the active session engine.

use std::{fmt, sync::Arc};

use keyward_core::{Identity, IdentityRecord, KeywardError, RatchetError, RatchetSession, RelayError, Ticket};

use crate::Keyward;

/// Handle to an established ratchet session with one participant.
#[derive(Clone)]
pub struct RatchetChat {
    session: Arc<dyn RatchetSession>,
}

impl RatchetChat {
    fn new(session: Arc<dyn RatchetSession>) -> Self {
        Self { session }
    }

    /// Correspondent on the other end.
    pub fn participant(&self) -> &Identity {
        self.session.participant()
    }

    /// Encrypt the next message for the participant.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, KeywardError> {
        Ok(self.session.encrypt(plaintext)?)
    }

    /// Decrypt a message from the participant.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, KeywardError> {
        Ok(self.session.decrypt(ciphertext)?)
    }
}

impl fmt::Debug for RatchetChat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RatchetChat").field("participant", self.participant()).finish()
    }
}

impl Keyward {
    /// Start a chat as sender and post the join ticket to the relay.
    ///
    /// # Errors
    ///
    /// - [`KeywardError::MissingPrivateKey`] without an active engine, or if
    ///   identity state changed while the chat was being set up
    /// - [`KeywardError::SelfChatForbidden`] for the principal itself
    /// - [`KeywardError::ChatAlreadyExists`] if a session is already open
    pub async fn create_ratchet_chat(
        &self,
        participant: &IdentityRecord,
    ) -> Result<RatchetChat, KeywardError> {
        let (engine, generation) = self.secure_chat()?;

        if participant.identity == self.identity {
            return Err(KeywardError::SelfChatForbidden);
        }

        let session = engine.start_session_as_sender(participant).await.map_err(chat_error)?;

        // A session without a posted ticket can never be joined.
        if let Err(error) = self.post_ticket(session.as_ref(), participant, generation).await {
            if let Err(cleanup) = engine.delete_session(&participant.identity) {
                tracing::warn!(
                    identity = %self.identity,
                    participant = %participant.identity,
                    error = %cleanup,
                    "failed to discard unposted ratchet session"
                );
            }
            return Err(error);
        }

        tracing::debug!(
            identity = %self.identity,
            participant = %participant.identity,
            "ratchet chat created"
        );
        Ok(RatchetChat::new(session))
    }

    async fn post_ticket(
        &self,
        session: &dyn RatchetSession,
        participant: &IdentityRecord,
        generation: u64,
    ) -> Result<(), KeywardError> {
        let mut marker = [0u8; 16];
        self.services.crypto.random_bytes(&mut marker);
        let ticket = Ticket::new(session.encrypt(hex::encode(marker).as_bytes())?);

        self.ensure_generation(generation)?;
        self.services.ticket_relay.store(&ticket, participant).await?;
        Ok(())
    }

    /// Join a chat `participant` created, using the ticket on the relay.
    ///
    /// # Errors
    ///
    /// [`KeywardError::MissingTicket`] if the participant has not created a
    /// chat with this principal.
    pub async fn join_ratchet_chat(
        &self,
        participant: &IdentityRecord,
    ) -> Result<RatchetChat, KeywardError> {
        let (engine, generation) = self.secure_chat()?;

        if participant.identity == self.identity {
            return Err(KeywardError::SelfChatForbidden);
        }

        let ticket = match self.services.ticket_relay.retrieve(participant).await {
            Ok(ticket) => ticket,
            Err(RelayError::NotFound) => return Err(KeywardError::MissingTicket),
            Err(e) => return Err(e.into()),
        };

        self.ensure_generation(generation)?;
        let session = engine.start_session_as_receiver(participant, &ticket).map_err(chat_error)?;

        tracing::debug!(
            identity = %self.identity,
            participant = %participant.identity,
            "ratchet chat joined"
        );
        Ok(RatchetChat::new(session))
    }

    /// Existing chat with `participant`, if any. Never creates one.
    pub fn get_ratchet_chat(
        &self,
        participant: &IdentityRecord,
    ) -> Result<Option<RatchetChat>, KeywardError> {
        let (engine, _) = self.secure_chat()?;
        Ok(engine.existing_session(&participant.identity).map(RatchetChat::new))
    }

    /// Delete the session with `participant`.
    ///
    /// # Errors
    ///
    /// [`KeywardError::MissingChat`] if no session exists.
    pub fn delete_ratchet_chat(&self, participant: &IdentityRecord) -> Result<(), KeywardError> {
        let (engine, _) = self.secure_chat()?;

        match engine.delete_session(&participant.identity) {
            Ok(()) => Ok(()),
            Err(RatchetError::NoSuchSession(_)) => Err(KeywardError::MissingChat),
            Err(e) => Err(e.into()),
        }
    }
}

fn chat_error(error: RatchetError) -> KeywardError {
    match error {
        RatchetError::SessionAlreadyExists(_) => KeywardError::ChatAlreadyExists,
        other => KeywardError::Ratchet(other),
    }
}
