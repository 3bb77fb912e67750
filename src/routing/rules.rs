use axum::http::Method;

use super::{Access, RouteRule};
use crate::auth::{Role, RoleSet};
use crate::database::{BenefitLink, DirectoryKind};

fn roles(roles: &[Role]) -> Access {
    Access::Roles(RoleSet::of(roles))
}

pub fn all() -> Result<Vec<RouteRule>, regex::Error> {
    let mut rules = system()?;
    rules.extend(auth()?);
    rules.extend(users()?);
    rules.extend(admins()?);
    for kind in DirectoryKind::ALL {
        rules.extend(directory(kind)?);
    }
    rules.extend(benefit_links()?);
    Ok(rules)
}

pub fn system() -> Result<Vec<RouteRule>, regex::Error> {
    Ok(vec![
        RouteRule::new(&[Method::GET], "/", Access::Public)?,
        RouteRule::new(&[Method::GET], "/health", Access::Public)?,
    ])
}

pub fn auth() -> Result<Vec<RouteRule>, regex::Error> {
    Ok(vec![
        RouteRule::new(&[Method::POST], "/api/auth/login", Access::Public)?,
        RouteRule::new(&[Method::POST], "/api/auth/refresh", Access::Public)?,
        RouteRule::new(&[Method::POST], "/api/auth/recovery", Access::Public)?,
        RouteRule::new(&[Method::POST], "/api/auth/recovery/confirm", Access::Public)?,
        RouteRule::new(&[Method::POST], "/api/auth/verify", Access::Public)?,
        RouteRule::new(&[Method::GET], "/api/auth/me", Access::Authenticated)?,
        RouteRule::new(&[Method::POST], "/api/auth/logout", Access::Authenticated)?,
        RouteRule::new(&[Method::POST], "/api/auth/resource-token", Access::Authenticated)?,
    ])
}

pub fn users() -> Result<Vec<RouteRule>, regex::Error> {
    Ok(vec![
        RouteRule::new(&[Method::POST], "/api/users", Access::Anonymous)?,
        RouteRule::new(&[Method::GET], "/api/users", roles(&[Role::Admin, Role::SuperAdmin]))?,
        RouteRule::new(
            &[Method::GET, Method::PUT, Method::DELETE],
            "/api/users/{id}",
            roles(&[Role::User]),
        )?,
        RouteRule::new(&[Method::PATCH], "/api/users/{id}/password", roles(&[Role::User]))?,
    ])
}

pub fn admins() -> Result<Vec<RouteRule>, regex::Error> {
    Ok(vec![
        RouteRule::new(&[Method::GET, Method::POST], "/api/admins", roles(&[Role::SuperAdmin]))?,
        RouteRule::new(
            &[Method::GET, Method::PUT],
            "/api/admins/{id}",
            roles(&[Role::Admin, Role::SuperAdmin]),
        )?,
        RouteRule::new(&[Method::DELETE], "/api/admins/{id}", roles(&[Role::SuperAdmin]))?,
    ])
}

/// Reads are public, writes need `ROLE_ADMIN`.
pub fn directory(kind: DirectoryKind) -> Result<Vec<RouteRule>, regex::Error> {
    let collection = format!("/api/{}", kind.segment());
    let item = format!("{}/{{id}}", collection);

    Ok(vec![
        RouteRule::new(&[Method::GET], &collection, Access::Public)?,
        RouteRule::new(&[Method::POST], &collection, roles(&[Role::Admin]))?,
        RouteRule::new(&[Method::GET], &item, Access::Public)?,
        RouteRule::new(&[Method::PUT, Method::DELETE], &item, roles(&[Role::Admin]))?,
    ])
}

pub fn benefit_links() -> Result<Vec<RouteRule>, regex::Error> {
    BenefitLink::ALL
        .iter()
        .map(|link| {
            RouteRule::new(
                &[Method::POST],
                &format!("/api/benefits/{{id}}/{}/{{target}}", link.target().segment()),
                roles(&[Role::Admin]),
            )
        })
        .collect()
}
