// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Adversarial end-to-end scenarios: relay → tamper proxy → agent, over real
//! loopback listeners. Each scenario demonstrates where one protection level
//! stops an on-path attacker, and where the undefended baseline does not.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;

use aegis_a2a_core::application::{SessionDispatcher, VerificationGate, VerificationMode};
use aegis_a2a_core::domain::collaborators::KeyType;
use aegis_a2a_core::domain::{
    AgentConfig, Envelope, IdentityProvider, SigningIdentity, TaskHandler, TaskMessage,
    TransportError,
};
use aegis_a2a_core::infrastructure::crypto::EphemeralHpkeSuite;
use aegis_a2a_core::infrastructure::relay::{OutboundRelay, RelayPolicy};
use aegis_a2a_core::infrastructure::resolver::InMemoryKeyResolver;
use aegis_a2a_core::infrastructure::session_registry::InMemorySessionRegistry;
use aegis_a2a_core::infrastructure::signing::{identity_from_secret, Ed25519SigningService};
use aegis_a2a_core::presentation::{app, AgentState};

use aegis_a2a_proxy::tamper::TamperPolicy;
use aegis_a2a_proxy::ProxyState;

struct RecordingHandler {
    calls: AtomicUsize,
    contents: Mutex<Vec<String>>,
}

impl RecordingHandler {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            contents: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskHandler for RecordingHandler {
    async fn handle(&self, message: TaskMessage, _envelope: &Envelope) -> Result<TaskMessage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.contents.lock().push(message.content.clone());
        Ok(message.reply("task.response", format!("echo: {}", message.content)))
    }
}

struct StaticProvider(SigningIdentity);

impl IdentityProvider for StaticProvider {
    fn load(&self) -> Result<SigningIdentity, TransportError> {
        Ok(self.0.clone())
    }
}

struct Agent {
    url: String,
    handler: Arc<RecordingHandler>,
    registry: Arc<InMemorySessionRegistry>,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

async fn spawn_agent(
    mode: VerificationMode,
    encrypted: bool,
    resolver: Arc<InMemoryKeyResolver>,
) -> Agent {
    init_tracing();
    let registry = Arc::new(InMemorySessionRegistry::new());
    let handler = RecordingHandler::new();
    let gate = VerificationGate::new(resolver, Arc::new(Ed25519SigningService)).with_mode(mode);
    let mut dispatcher = SessionDispatcher::new(registry.clone(), handler.clone());
    if encrypted {
        dispatcher = dispatcher.with_negotiator(Arc::new(EphemeralHpkeSuite::new()));
    }

    let state = Arc::new(AgentState {
        config: AgentConfig {
            name: "payment-agent".to_string(),
            kind: "payment".to_string(),
            listen_addr: "127.0.0.1:0".to_string(),
            route_path: "/a2a/payment".to_string(),
            signed: mode == VerificationMode::Required,
            encrypted,
            peers: vec![],
        },
        gate: Arc::new(gate),
        dispatcher: Arc::new(dispatcher),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app(state)).await.unwrap();
    });

    Agent {
        url: format!("http://{addr}"),
        handler,
        registry,
    }
}

async fn spawn_proxy(upstream: &str, policy: TamperPolicy) -> (String, Arc<ProxyState>) {
    let state = Arc::new(ProxyState::new(upstream.to_string()).with_policy(policy));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app_state = state.clone();
    tokio::spawn(async move {
        axum::serve(listener, aegis_a2a_proxy::app(app_state)).await.unwrap();
    });
    (format!("http://{addr}"), state)
}

async fn provisioned_relay(
    resolver: &InMemoryKeyResolver,
    seed: u8,
    encrypted: bool,
) -> OutboundRelay {
    let (identity, public) = identity_from_secret([seed; 32]);
    resolver
        .register(identity.did.clone(), KeyType::Signing, public)
        .await;

    let mut relay = OutboundRelay::new(
        Arc::new(Ed25519SigningService),
        Arc::new(StaticProvider(identity)),
    );
    if encrypted {
        relay = relay.with_initiator(Arc::new(EphemeralHpkeSuite::new()));
    }
    relay
}

fn task(content: &str) -> TaskMessage {
    TaskMessage::new("did:aegis:traveler", "did:aegis:payment", "task.request", content)
}

// Scenario 2: Signed=on, Tamper=mutate-plaintext: rejected before the
// handler by the digest guard.
#[tokio::test]
async fn test_signed_mode_catches_plaintext_mutation() {
    let resolver = Arc::new(InMemoryKeyResolver::new());
    let agent = spawn_agent(VerificationMode::Required, false, resolver.clone()).await;
    let (proxy_url, _proxy) = spawn_proxy(&agent.url, TamperPolicy::mutate_plaintext()).await;
    let relay = provisioned_relay(&resolver, 21, false).await;
    relay.set_policy(RelayPolicy {
        signed: true,
        encrypted: false,
    });

    let err = relay
        .send(&task("pay 100"), &format!("{proxy_url}/a2a/payment"))
        .await
        .unwrap_err();

    match err {
        TransportError::UpstreamStatus { status, reason } => {
            assert_eq!(status, 401);
            assert_eq!(reason, "digest-mismatch");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(agent.handler.calls(), 0);
}

// Scenario 3: Encrypted=on, Tamper=flip-ciphertext: the handshake passes
// untouched, the flipped data call fails authenticated decryption, and the
// caller sees only a generic application error.
#[tokio::test]
async fn test_encryption_catches_ciphertext_flip() {
    let resolver = Arc::new(InMemoryKeyResolver::new());
    // Optional gate: this scenario demonstrates the encryption layer alone.
    let agent = spawn_agent(VerificationMode::Optional, true, resolver.clone()).await;
    let (proxy_url, _proxy) = spawn_proxy(&agent.url, TamperPolicy::flip_ciphertext()).await;
    let relay = provisioned_relay(&resolver, 22, true).await;
    relay.set_policy(RelayPolicy {
        signed: true,
        encrypted: true,
    });

    let err = relay
        .send(&task("transfer 500"), &format!("{proxy_url}/a2a/payment"))
        .await
        .unwrap_err();

    // The handshake itself was never tampered: a session exists.
    assert_eq!(agent.registry.len(), 1);

    match err {
        TransportError::UpstreamStatus { status, reason } => {
            assert_eq!(status, 500);
            assert_eq!(reason, "application error");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(agent.handler.calls(), 0);
}

// Scenario 5: Signed=off, Encrypted=off, Tamper=mutate-plaintext: the
// undefended baseline: the request "succeeds" and the handler observes the
// injected content.
#[tokio::test]
async fn test_undefended_baseline_accepts_mutated_content() {
    let resolver = Arc::new(InMemoryKeyResolver::new());
    let agent = spawn_agent(VerificationMode::Optional, false, resolver.clone()).await;
    let (proxy_url, _proxy) = spawn_proxy(&agent.url, TamperPolicy::mutate_plaintext()).await;
    let relay = provisioned_relay(&resolver, 23, false).await;

    let reply = relay
        .send(&task("pay 100"), &format!("{proxy_url}/a2a/payment"))
        .await
        .unwrap();

    assert_eq!(agent.handler.calls(), 1);
    let contents = agent.handler.contents.lock();
    assert_eq!(contents[0], "pay 100 [tampered-by-proxy]");
    assert_eq!(reply.content, "echo: pay 100 [tampered-by-proxy]");
}

// With tampering off the proxy is a faithful pass-through, signatures
// included.
#[tokio::test]
async fn test_passthrough_preserves_signed_traffic() {
    let resolver = Arc::new(InMemoryKeyResolver::new());
    let agent = spawn_agent(VerificationMode::Required, false, resolver.clone()).await;
    let (proxy_url, _proxy) = spawn_proxy(&agent.url, TamperPolicy::off()).await;
    let relay = provisioned_relay(&resolver, 24, false).await;
    relay.set_policy(RelayPolicy {
        signed: true,
        encrypted: false,
    });

    let reply = relay
        .send(&task("book"), &format!("{proxy_url}/a2a/payment"))
        .await
        .unwrap();
    assert_eq!(reply.content, "echo: book");
    assert_eq!(agent.handler.calls(), 1);
}

// Runtime policy flip on a live proxy: the same channel degrades from
// faithful to hostile without restarting anything.
#[tokio::test]
async fn test_policy_toggles_at_runtime() {
    let resolver = Arc::new(InMemoryKeyResolver::new());
    let agent = spawn_agent(VerificationMode::Required, false, resolver.clone()).await;
    let (proxy_url, proxy) = spawn_proxy(&agent.url, TamperPolicy::off()).await;
    let relay = provisioned_relay(&resolver, 25, false).await;
    relay.set_policy(RelayPolicy {
        signed: true,
        encrypted: false,
    });

    let target = format!("{proxy_url}/a2a/payment");
    relay.send(&task("first"), &target).await.unwrap();

    proxy.set_policy(TamperPolicy::mutate_plaintext());
    let err = relay.send(&task("second"), &target).await.unwrap_err();
    assert!(matches!(
        err,
        TransportError::UpstreamStatus { status: 401, .. }
    ));
    assert_eq!(agent.handler.calls(), 1);
}
