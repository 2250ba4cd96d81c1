use utoipa::OpenApi;

use crate::routes::{meta, v1};

#[derive(OpenApi)]
#[openapi(info(
    title = "octa-server",
    description = "Geospatial and network analysis API",
    version = "0.1.0"
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(meta::MetaApi::openapi());
    root.merge(v1::api_docs());
    root
}
