pub mod api;
pub mod api_key;
pub mod builder;
pub mod client;
pub mod multi_write;
pub mod request;
pub mod resource;
pub mod response;
pub mod transport;
pub mod types;

pub const API_BASE_URL: &str = "https://api.zotero.org";

pub(crate) mod headers {
    pub const ZOTERO_API_VERSION: &str = "Zotero-API-Version";
    pub const ZOTERO_WRITE_TOKEN: &str = "Zotero-Write-Token";
    pub const LAST_MODIFIED_VERSION: &str = "Last-Modified-Version";
    pub const IF_MODIFIED_SINCE_VERSION: &str = "If-Modified-Since-Version";
    pub const IF_UNMODIFIED_SINCE_VERSION: &str = "If-Unmodified-Since-Version";
    pub const TOTAL_RESULTS: &str = "Total-Results";

    pub const API_VERSION: &str = "3";
}
