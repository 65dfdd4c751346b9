//! Route access policy.
//!
//! A pure decision function over (path, identity, peer address). The
//! transport layer applies the decision; nothing here knows about HTTP
//! beyond path strings.
//!
//! Public paths bypass the gate entirely. Every other path requires an
//! identity, and some prefixes additionally require a role from a static
//! table. The database-admin console is reachable only from loopback.

use std::net::IpAddr;

use crate::session::{Identity, Role};

/// Where an unauthenticated visitor is sent
pub const LOGIN_PATH: &str = "/login";

/// Where a role mismatch is sent
pub const HOME_PATH: &str = "/";

/// Outcome of a gate evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Serve the request
    Allow,
    /// Send the browser elsewhere
    Redirect(&'static str),
}

/// Paths served without identity: static assets, the gateway's own API
/// namespace, and the anonymous pages.
pub fn is_public(path: &str) -> bool {
    if path.starts_with("/_next") || path.starts_with("/public") || path.starts_with("/favicon.ico")
    {
        return true;
    }
    if path.starts_with("/API/") {
        return true;
    }
    matches!(path, "/" | "/login" | "/register")
}

/// Role sets per route prefix. `None` means any authenticated identity.
fn allowed_roles(path: &str) -> Option<&'static [Role]> {
    use Role::*;

    if path.starts_with("/admin") {
        return Some(&[Aro, Dro]);
    }
    if path.starts_with("/grades") {
        return Some(&[Student, Guardian, Aro]);
    }
    if path.starts_with("/disciplinary") || path.starts_with("/disciplinaries") {
        return Some(&[Dro]);
    }
    if path.starts_with("/enrollments") || path.starts_with("/courses") {
        return Some(&[Aro, Dro]);
    }
    if path.starts_with("/reports") {
        return Some(&[Student, Guardian, Aro, Dro]);
    }
    if path.starts_with("/students") {
        return Some(&[Aro, Dro]);
    }
    if path.starts_with("/profile") {
        return Some(&[Student, Aro, Guardian, Dro]);
    }
    None
}

/// Evaluate access for a request.
///
/// `peer` is the remote socket address's IP, used for the loopback-only
/// predicate on `/dba`.
pub fn decide(path: &str, identity: Option<&Identity>, peer: IpAddr) -> Decision {
    if is_public(path) {
        return Decision::Allow;
    }

    let identity = match identity {
        Some(identity) => identity,
        None => return Decision::Redirect(LOGIN_PATH),
    };

    // Database-admin console: loopback origin AND the DBA role
    if path.starts_with("/dba") {
        if !peer.is_loopback() || identity.role != Role::Dba {
            return Decision::Redirect(HOME_PATH);
        }
        return Decision::Allow;
    }

    if let Some(roles) = allowed_roles(path) {
        if !roles.contains(&identity.role) {
            return Decision::Redirect(HOME_PATH);
        }
    }

    Decision::Allow
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::net::{IpAddr, Ipv4Addr};

    const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
    const REMOTE: IpAddr = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9));

    fn identity(role: Role) -> Identity {
        Identity {
            email: "user@records.example".into(),
            role,
            name: None,
            exp: Utc::now().timestamp_millis() + 60_000,
        }
    }

    #[test]
    fn test_public_paths_bypass() {
        assert_eq!(decide("/", None, REMOTE), Decision::Allow);
        assert_eq!(decide("/login", None, REMOTE), Decision::Allow);
        assert_eq!(decide("/register", None, REMOTE), Decision::Allow);
        assert_eq!(decide("/_next/static/chunk.js", None, REMOTE), Decision::Allow);
        assert_eq!(decide("/favicon.ico", None, REMOTE), Decision::Allow);
        assert_eq!(decide("/API/public-key", None, REMOTE), Decision::Allow);
    }

    #[test]
    fn test_anonymous_redirects_to_login() {
        assert_eq!(decide("/grades", None, REMOTE), Decision::Redirect(LOGIN_PATH));
        assert_eq!(decide("/profile", None, REMOTE), Decision::Redirect(LOGIN_PATH));
    }

    #[test]
    fn test_role_mismatch_redirects_home() {
        let student = identity(Role::Student);
        assert_eq!(decide("/admin", Some(&student), REMOTE), Decision::Redirect(HOME_PATH));
        assert_eq!(decide("/students", Some(&student), REMOTE), Decision::Redirect(HOME_PATH));
        assert_eq!(
            decide("/disciplinary", Some(&student), REMOTE),
            Decision::Redirect(HOME_PATH)
        );
    }

    #[test]
    fn test_role_match_allows() {
        assert_eq!(decide("/admin", Some(&identity(Role::Aro)), REMOTE), Decision::Allow);
        assert_eq!(decide("/grades", Some(&identity(Role::Guardian)), REMOTE), Decision::Allow);
        assert_eq!(decide("/disciplinary", Some(&identity(Role::Dro)), REMOTE), Decision::Allow);
        assert_eq!(decide("/reports", Some(&identity(Role::Student)), REMOTE), Decision::Allow);
        assert_eq!(decide("/profile", Some(&identity(Role::Student)), REMOTE), Decision::Allow);
    }

    #[test]
    fn test_unlisted_path_needs_identity_only() {
        assert_eq!(decide("/settings", None, REMOTE), Decision::Redirect(LOGIN_PATH));
        assert_eq!(decide("/settings", Some(&identity(Role::Student)), REMOTE), Decision::Allow);
    }

    #[test]
    fn test_dba_needs_loopback_and_role() {
        let dba = identity(Role::Dba);
        let aro = identity(Role::Aro);

        assert_eq!(decide("/dba", Some(&dba), LOOPBACK), Decision::Allow);
        assert_eq!(decide("/dba", Some(&dba), REMOTE), Decision::Redirect(HOME_PATH));
        assert_eq!(decide("/dba", Some(&aro), LOOPBACK), Decision::Redirect(HOME_PATH));
        assert_eq!(decide("/dba", None, LOOPBACK), Decision::Redirect(LOGIN_PATH));
    }

    #[test]
    fn test_ipv6_loopback_counts() {
        let dba = identity(Role::Dba);
        assert_eq!(
            decide("/dba", Some(&dba), "::1".parse().unwrap()),
            Decision::Allow
        );
    }
}
