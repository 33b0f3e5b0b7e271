//! Simulated ratchet session engine.
//!
//! Sessions are two forward-secure symmetric chains seeded from a random root
//! chosen by the sender. The root travels inside the ticket in the clear, so
//! this engine protects nothing against an observer of the relay. It exists
//! to exercise the orchestrator's session lifecycle deterministically.

#![allow(clippy::disallowed_types, reason = "Synchronous session state only")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, Weak},
};

use async_trait::async_trait;
use keyward_core::{
    Environment, Identity, IdentityRecord, KeyPair, RatchetEngine, RatchetEngineFactory,
    RatchetError, RatchetSession, ResetOutcome, RotationLog, Ticket, TokenSource,
};
use keyward_crypto::chain::{
    EncryptedMessage, NONCE_RANDOM_SIZE, SymmetricRatchet, decrypt_message, derive_chain_seed,
    encrypt_message,
};
use serde::{Deserialize, Serialize};

use crate::{Fault, SimCloud, SimEnv};

/// Service name presented to the token source.
const RATCHET_SERVICE: &str = "ratchet";

/// One-time keys uploaded when keys are first published.
const ONE_TIME_KEYS: u32 = 100;

/// Wire form of a session message.
#[derive(Serialize, Deserialize)]
struct Envelope {
    /// Session root, present only in the first message (the ticket)
    root: Option<[u8; 32]>,
    message: EncryptedMessage,
}

impl Envelope {
    fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        let Ok(()) = ciborium::ser::into_writer(self, &mut bytes) else {
            unreachable!("CBOR encoding into a Vec cannot fail");
        };
        bytes
    }

    fn decode(bytes: &[u8]) -> Result<Self, RatchetError> {
        ciborium::de::from_reader(bytes).map_err(|e| RatchetError::Decryption(e.to_string()))
    }
}

struct Chains {
    send: SymmetricRatchet,
    recv: SymmetricRatchet,
    /// Root to embed in the next outgoing message
    pending_root: Option<[u8; 32]>,
}

/// Session with one participant.
pub struct SimSession {
    participant: Identity,
    chains: Mutex<Chains>,
    env: SimEnv,
}

impl SimSession {
    fn new(
        own: &Identity,
        participant: Identity,
        root: &[u8; 32],
        pending_root: Option<[u8; 32]>,
        env: SimEnv,
    ) -> Self {
        let send = SymmetricRatchet::new(&derive_chain_seed(root, own.as_bytes()));
        let recv = SymmetricRatchet::new(&derive_chain_seed(root, participant.as_bytes()));

        Self { participant, chains: Mutex::new(Chains { send, recv, pending_root }), env }
    }

    #[allow(clippy::expect_used)]
    fn chains(&self) -> MutexGuard<'_, Chains> {
        self.chains.lock().expect("SimSession mutex poisoned")
    }

    fn open(&self, envelope: &Envelope) -> Result<Vec<u8>, RatchetError> {
        let mut chains = self.chains();
        let key = chains
            .recv
            .advance_to(envelope.message.generation)
            .map_err(|e| RatchetError::Decryption(e.to_string()))?;
        decrypt_message(&envelope.message, &key).map_err(|e| RatchetError::Decryption(e.to_string()))
    }
}

impl RatchetSession for SimSession {
    fn participant(&self) -> &Identity {
        &self.participant
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, RatchetError> {
        let mut chains = self.chains();
        let key = chains.send.advance().map_err(|e| RatchetError::Encryption(e.to_string()))?;

        let mut suffix = [0u8; NONCE_RANDOM_SIZE];
        self.env.random_bytes(&mut suffix);

        let envelope =
            Envelope { root: chains.pending_root.take(), message: encrypt_message(plaintext, &key, suffix) };
        Ok(envelope.encode())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, RatchetError> {
        self.open(&Envelope::decode(ciphertext)?)
    }
}

/// Ratchet engine for one identity, backed by the [`SimCloud`] key server.
pub struct SimRatchetEngine {
    identity: Identity,
    cloud: SimCloud,
    tokens: Arc<dyn TokenSource>,
    env: SimEnv,
    sessions: Mutex<HashMap<Identity, Arc<SimSession>>>,
}

impl SimRatchetEngine {
    /// Identity this engine was built for.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    async fn authorize(&self) -> Result<(), RatchetError> {
        self.tokens.token(RATCHET_SERVICE).await?;
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn sessions(&self) -> MutexGuard<'_, HashMap<Identity, Arc<SimSession>>> {
        self.sessions.lock().expect("SimRatchetEngine mutex poisoned")
    }
}

#[async_trait]
impl RatchetEngine for SimRatchetEngine {
    async fn reset(&self) -> Result<ResetOutcome, RatchetError> {
        self.authorize().await?;
        self.cloud.check(Fault::Reset).map_err(RatchetError::Network)?;

        self.sessions().clear();
        if self.cloud.clear_ratchet_keys(&self.identity) {
            Ok(ResetOutcome::Cleared)
        } else {
            Ok(ResetOutcome::NoKeysOnCloud)
        }
    }

    async fn rotate_keys(&self) -> Result<RotationLog, RatchetError> {
        self.authorize().await?;
        self.cloud.check(Fault::Rotate).map_err(RatchetError::Network)?;

        let published = self.cloud.rotate_ratchet_keys(&self.identity);
        Ok(RotationLog {
            long_term_key_rotated: published,
            one_time_keys_added: if published { ONE_TIME_KEYS } else { 0 },
            one_time_keys_removed: 0,
        })
    }

    async fn start_session_as_sender(
        &self,
        receiver: &IdentityRecord,
    ) -> Result<Arc<dyn RatchetSession>, RatchetError> {
        self.authorize().await?;

        if self.sessions().contains_key(&receiver.identity) {
            return Err(RatchetError::SessionAlreadyExists(receiver.identity.clone()));
        }
        if !self.cloud.has_ratchet_keys(&receiver.identity) {
            return Err(RatchetError::PeerKeysMissing(receiver.identity.clone()));
        }

        let root = self.env.random_array();
        let session = Arc::new(SimSession::new(
            &self.identity,
            receiver.identity.clone(),
            &root,
            Some(root),
            self.env.clone(),
        ));

        self.sessions().insert(receiver.identity.clone(), Arc::clone(&session));
        Ok(session)
    }

    fn start_session_as_receiver(
        &self,
        sender: &IdentityRecord,
        ticket: &Ticket,
    ) -> Result<Arc<dyn RatchetSession>, RatchetError> {
        let mut sessions = self.sessions();
        if sessions.contains_key(&sender.identity) {
            return Err(RatchetError::SessionAlreadyExists(sender.identity.clone()));
        }

        let envelope = Envelope::decode(ticket.as_bytes())
            .map_err(|e| RatchetError::InvalidTicket(e.to_string()))?;
        let Some(root) = envelope.root else {
            return Err(RatchetError::InvalidTicket("ticket carries no session root".into()));
        };

        let session = Arc::new(SimSession::new(
            &self.identity,
            sender.identity.clone(),
            &root,
            None,
            self.env.clone(),
        ));
        session.open(&envelope).map_err(|e| RatchetError::InvalidTicket(e.to_string()))?;

        sessions.insert(sender.identity.clone(), Arc::clone(&session));
        Ok(session)
    }

    fn existing_session(&self, participant: &Identity) -> Option<Arc<dyn RatchetSession>> {
        self.sessions()
            .get(participant)
            .map(|session| Arc::clone(session) as Arc<dyn RatchetSession>)
    }

    fn delete_session(&self, participant: &Identity) -> Result<(), RatchetError> {
        self.sessions()
            .remove(participant)
            .map(|_| ())
            .ok_or_else(|| RatchetError::NoSuchSession(participant.clone()))
    }
}

/// Builds [`SimRatchetEngine`]s and keeps weak handles to them.
///
/// The weak handles let tests check that a torn-down engine is actually
/// released.
#[derive(Clone)]
pub struct SimRatchetFactory {
    cloud: SimCloud,
    env: SimEnv,
    engines: Arc<Mutex<Vec<Weak<SimRatchetEngine>>>>,
}

impl SimRatchetFactory {
    /// Factory for engines backed by `cloud`.
    pub fn new(cloud: SimCloud, env: SimEnv) -> Self {
        Self { cloud, env, engines: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Number of engines built so far.
    #[allow(clippy::expect_used)]
    pub fn created(&self) -> usize {
        self.engines.lock().expect("SimRatchetFactory mutex poisoned").len()
    }

    /// Number of engines still referenced by anyone.
    #[allow(clippy::expect_used)]
    pub fn live(&self) -> usize {
        self.engines
            .lock()
            .expect("SimRatchetFactory mutex poisoned")
            .iter()
            .filter(|engine| engine.strong_count() > 0)
            .count()
    }
}

#[async_trait]
impl RatchetEngineFactory for SimRatchetFactory {
    async fn create(
        &self,
        record: &IdentityRecord,
        key_pair: &KeyPair,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Arc<dyn RatchetEngine>, RatchetError> {
        if record.public_key != key_pair.public_key() {
            return Err(RatchetError::InvalidTicket("record does not match key pair".into()));
        }
        tokens.token(RATCHET_SERVICE).await?;

        let engine = Arc::new(SimRatchetEngine {
            identity: record.identity.clone(),
            cloud: self.cloud.clone(),
            tokens,
            env: self.env.clone(),
            sessions: Mutex::new(HashMap::new()),
        });

        #[allow(clippy::expect_used)]
        self.engines.lock().expect("SimRatchetFactory mutex poisoned").push(Arc::downgrade(&engine));

        Ok(engine)
    }
}
