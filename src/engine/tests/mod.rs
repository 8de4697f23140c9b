use std::sync::Arc;

use super::*;
use crate::ast::Expr;
use crate::snapshot_decision;
use crate::types::{Decision, Entities, Entity, EntityUid, Policy, ScopeConstraint};
use yare::parameterized;

mod authorize;

fn user(id: &str) -> EntityUid {
    EntityUid::new("User", id)
}

fn group(id: &str) -> EntityUid {
    EntityUid::new("Group", id)
}

fn action(id: &str) -> EntityUid {
    EntityUid::new("Action", id)
}

fn photo(id: &str) -> EntityUid {
    EntityUid::new("Photo", id)
}

/// alice is an admin, bob a viewer, carol belongs to no group. dave is not
/// in the store at all.
fn photo_store() -> Entities {
    Entities::from_entities([
        Entity::new(user("alice")).with_parent(group("admins")),
        Entity::new(user("bob")).with_parent(group("viewers")),
        Entity::new(user("carol")),
        Entity::new(group("admins")),
        Entity::new(group("viewers")),
        Entity::new(photo("beach.jpg"))
            .with_attr("owner", user("carol"))
            .with_attr("private", false),
        Entity::new(photo("secret.jpg"))
            .with_attr("owner", user("bob"))
            .with_attr("private", true),
    ])
    .expect("fixture entities are unique")
}

fn admins_all() -> Policy {
    Policy::permit()
        .with_principal(ScopeConstraint::In(group("admins")))
        .with_resource(ScopeConstraint::Is("Photo".into()))
}

fn viewers_view() -> Policy {
    Policy::permit()
        .with_principal(ScopeConstraint::In(group("viewers")))
        .with_action(ScopeConstraint::Eq(action("view")))
        .with_resource(ScopeConstraint::Is("Photo".into()))
        .unless(Expr::get_attr(Expr::resource(), "private"))
}

fn owner_edit() -> Policy {
    Policy::permit()
        .with_action(ScopeConstraint::InSet(vec![action("edit"), action("delete")]))
        .with_resource(ScopeConstraint::Is("Photo".into()))
        .when(Expr::eq(
            Expr::get_attr(Expr::resource(), "owner"),
            Expr::principal(),
        ))
}

fn no_delete_private() -> Policy {
    Policy::forbid()
        .with_action(ScopeConstraint::Eq(action("delete")))
        .when(Expr::and(
            Expr::has_attr(Expr::resource(), "private"),
            Expr::get_attr(Expr::resource(), "private"),
        ))
}

/// Matches every photo request and fails on every photo: no photo has a
/// rating.
fn rated() -> Policy {
    Policy::permit()
        .with_resource(ScopeConstraint::Is("Photo".into()))
        .when(Expr::greater(
            Expr::get_attr(Expr::resource(), "rating"),
            Expr::val(3_i64),
        ))
}

fn photo_policies() -> PolicySet {
    PolicySet::from_policies([
        ("admins-all", admins_all()),
        ("viewers-view", viewers_view()),
        ("owner-edit", owner_edit()),
        ("no-delete-private", no_delete_private()),
    ])
    .expect("fixture policy ids are unique")
}

fn engine() -> PolicyEngine {
    PolicyEngine::new(photo_policies())
}

fn request(principal: &str, verb: &str, resource: &str) -> Request {
    Request::new(user(principal), action(verb), photo(resource))
}

fn assert_allow(response: &Response) {
    assert_eq!(response.decision, Decision::Allow, "{response}");
}

fn assert_deny(response: &Response) {
    assert_eq!(response.decision, Decision::Deny, "{response}");
}

#[derive(Clone)]
struct SharedLogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

struct SharedLogWriter(Arc<std::sync::Mutex<Vec<u8>>>);

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedLogBuffer {
    type Writer = SharedLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SharedLogWriter(Arc::clone(&self.0))
    }
}

impl std::io::Write for SharedLogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Installs a process-wide subscriber writing into a shared buffer. Other
/// tests running at the same time also log into it, so assertions should
/// look for specific lines rather than compare the whole buffer.
fn capture_logs() -> SharedLogBuffer {
    use std::sync::OnceLock;

    static LOG_SINK: OnceLock<SharedLogBuffer> = OnceLock::new();
    LOG_SINK
        .get_or_init(|| {
            let sink = SharedLogBuffer(Arc::new(std::sync::Mutex::new(Vec::new())));
            let subscriber = tracing_subscriber::fmt()
                .with_ansi(false)
                .without_time()
                .with_target(false)
                .with_max_level(tracing::Level::DEBUG)
                .with_writer(sink.clone())
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .expect("global test subscriber should initialize");
            tracing::callsite::rebuild_interest_cache();
            sink
        })
        .clone()
}

impl SharedLogBuffer {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}
