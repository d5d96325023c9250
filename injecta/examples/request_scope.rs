//! Simulated request loop: one owner per request.
//!
//! Run with `RUST_LOG=injecta=trace` to watch resolvers create, cache and
//! reuse instances.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use injecta::prelude::*;

// === Types ===

struct Config {
    database_url: String,
}

/// One per request, shared by everything that touches the database.
struct Connection {
    id: u64,
    url: String,
}

struct UserRepository {
    conn: Arc<Connection>,
}

impl UserRepository {
    fn find_user(&self, id: u64) -> String {
        format!("user {id} via connection #{} ({})", self.conn.id, self.conn.url)
    }
}

struct AuditLog {
    conn: Arc<Connection>,
}

impl AuditLog {
    fn record(&self, action: &str) -> String {
        format!("audit '{action}' via connection #{}", self.conn.id)
    }
}

struct Request {
    path: String,
    user_id: u64,
}

/// Allocated through `Construct`; key derived from the type name.
struct Greeter {
    prefix: String,
}

impl Construct for Greeter {
    fn construct(inv: &Invocation<'_>) -> Result<Self> {
        let prefix = inv.arg::<&'static str>(0).copied().unwrap_or("hello");
        Ok(Greeter {
            prefix: prefix.to_string(),
        })
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("injecta=debug,injecta_container=debug")
        .init();

    let connections = Arc::new(AtomicU64::new(0));

    let injection = Injection::setup(
        |c| {
            c.register_instance(
                "Config",
                Config {
                    database_url: "postgres://localhost/app".to_string(),
                },
            )?;

            let counter = connections.clone();
            c.register_transient_scoped_factory(
                "connection",
                move |inv| {
                    let config = inv.owner().resolve::<Config>("config", Args::new())?;
                    Ok(Connection {
                        id: counter.fetch_add(1, Ordering::SeqCst) + 1,
                        url: config.database_url.clone(),
                    })
                },
                None,
                Args::new(),
            )?;

            c.register_transient_factory(
                "userRepository",
                |inv| {
                    let conn = inv.owner().resolve::<Connection>("connection", Args::new())?;
                    Ok(UserRepository { conn })
                },
                false,
                None,
                Args::new(),
            )?;

            c.register_transient_factory(
                "auditLog",
                |inv| {
                    let conn = inv.owner().resolve::<Connection>("connection", Args::new())?;
                    Ok(AuditLog { conn })
                },
                false,
                None,
                Args::new(),
            )?;

            c.register_singleton::<Greeter>(Args::new().with("welcome"))?;

            for (name, tags) in [("json", vec!["api", "any"]), ("html", vec!["web", "any"]), ("text", vec!["cli"])] {
                c.register_instance(RegistrationTarget::tagged("renderer", tags), name)?;
            }
            Ok(())
        },
        Options::new(),
    )?;

    let injector = injection.injector();
    let requests = [
        Request {
            path: "/users/1".to_string(),
            user_id: 1,
        },
        Request {
            path: "/users/42".to_string(),
            user_id: 42,
        },
    ];

    for request in requests {
        let lines = injector.inject_request(request, |owner| -> Result<Vec<String>> {
            let req = owner.value::<Request>("req").map(|r| (r.path.clone(), r.user_id));
            let (path, user_id) = req.unwrap_or_default();

            let users = owner.resolve::<UserRepository>("userRepository", Args::new())?;
            let audit = owner.resolve::<AuditLog>("auditLog", Args::new())?;
            let greeter = owner.resolve::<Greeter>("greeter", Args::new())?;

            let mut lines = vec![
                format!("{} {path}", greeter.prefix),
                users.find_user(user_id),
                audit.record("read"),
            ];
            for renderer in owner.group("renderer")?.resolvers("any")? {
                lines.push(format!("renderer: {}", renderer.get::<&'static str>(Args::new())?));
            }
            Ok(lines)
        })??;

        for line in lines {
            println!("{line}");
        }
        println!();
    }

    println!("connections opened: {}", connections.load(Ordering::SeqCst));
    let snapshot = injection.statistics();
    println!("created per key: {:?}", snapshot.created.by_key);
    println!("scoped hits: {}", snapshot.scoped_hits.total);
    println!("singleton reuses: {}", snapshot.singleton_reuses.total);

    Ok(())
}
