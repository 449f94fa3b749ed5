//! HTTP control surface of the crawler: routes, admin authentication,
//! DTOs and OpenAPI documentation.

pub mod auth;
pub mod dto;
pub mod error;
pub mod openapi;
pub mod routes;
pub mod state;
