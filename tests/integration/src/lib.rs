//! Test doubles for the end-to-end scenarios: a mock gateway server
//! (WebSocket) and a mock REST API (plain HTTP/1.1).

pub mod mock_api;
pub mod mock_gateway;
