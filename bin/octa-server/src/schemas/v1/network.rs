use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

#[derive(Debug, Deserialize, ToSchema, IntoParams, Validate)]
pub struct ShortestPathQuery {
    #[validate(length(min = 1, message = "start_node must not be empty"))]
    pub start_node: String,
    #[validate(length(min = 1, message = "end_node must not be empty"))]
    pub end_node: String,
}

#[derive(Debug, Deserialize, ToSchema, IntoParams, Validate)]
pub struct CentralityQuery {
    #[validate(length(min = 1, message = "network_id must not be empty"))]
    pub network_id: String,
}
