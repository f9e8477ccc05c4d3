use anyhow::Context;
use clap::Parser;
use serde_json::Value;
use zotero_request::{
    API_BASE_URL, ApiKey, LibraryKey, Method, Outcome, QueryParam, QueryParams, RequestHeaders,
    RequestOptions, ResourceDescriptor, ResourceKind, ZoteroClientBuilder,
};

/// Sends a single request to the Zotero API and prints the result.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Zotero API Key
    #[arg(short, long)]
    api_key: Option<String>,

    /// Library to address, e.g. 'u475425' or 'g12345'
    #[arg(short, long)]
    library: Option<LibraryKey>,

    /// Resource segment as 'kind' or 'kind=key', e.g. '--resource items=ABCD2345 --resource children'
    #[arg(short, long = "resource", value_parser = parse_segment)]
    resources: Vec<(ResourceKind, Option<String>)>,

    /// Query parameter as 'name=value', e.g. '--query format=bibtex'
    #[arg(short, long = "query", value_parser = parse_query)]
    queries: Vec<(QueryParam, String)>,

    /// HTTP method
    #[arg(short, long, default_value = "get")]
    method: Method,

    /// Library version the request is conditional on
    #[arg(long)]
    since_version: Option<u64>,

    /// JSON file to send as the request body
    #[arg(short, long)]
    body: Option<String>,

    /// Keys to delete from the addressed collection
    #[arg(long = "delete-key")]
    delete_keys: Vec<String>,

    /// API origin
    #[arg(long, default_value = API_BASE_URL)]
    base_url: String,

    /// Output file (if not provided, prints to stdout)
    #[arg(short, long)]
    file: Option<String>,
}

fn parse_segment(s: &str) -> Result<(ResourceKind, Option<String>), String> {
    let (kind, key) = match s.split_once('=') {
        Some((kind, key)) => (kind, Some(key.to_string())),
        None => (s, None),
    };
    let kind = kind.parse::<ResourceKind>().map_err(|e| e.to_string())?;
    Ok((kind, key))
}

fn parse_query(s: &str) -> Result<(QueryParam, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected 'name=value', got '{}'", s))?;
    let param = name.parse::<QueryParam>().map_err(|e| e.to_string())?;
    Ok((param, value.to_string()))
}

impl Args {
    fn resource(&self) -> ResourceDescriptor {
        let resource = match &self.library {
            Some(library) => ResourceDescriptor::for_library(library),
            None => ResourceDescriptor::new(),
        };
        self.resources
            .iter()
            .fold(resource, |resource, (kind, key)| {
                resource.with(*kind, key.as_deref())
            })
    }

    fn options(&self) -> anyhow::Result<RequestOptions> {
        let query = self
            .queries
            .iter()
            .fold(QueryParams::new(), |query, (param, value)| {
                query.set(*param, value)
            });
        let mut headers = RequestHeaders::default();
        if let Some(version) = self.since_version {
            match self.method {
                Method::Get => headers.if_modified_since_version = Some(version),
                _ => headers.if_unmodified_since_version = Some(version),
            }
        }
        let mut options = RequestOptions::new(self.method)
            .with_query(query)
            .with_headers(headers)
            .with_keys_to_delete(self.delete_keys.iter().cloned());
        if let Some(path) = &self.body {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read body from '{}'", path))?;
            let body: Value = serde_json::from_str(&text)
                .with_context(|| format!("Body in '{}' is not valid JSON", path))?;
            options = options.with_body(body);
        }
        Ok(options)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut builder = ZoteroClientBuilder::new().base_url(args.base_url.clone());
    if let Some(api_key) = &args.api_key {
        builder = builder.api_key(ApiKey::from(api_key.as_str()));
    }
    let client = builder.build()?;

    let outcome = client.request(&args.resource(), args.options()?).await?;
    if let Some(version) = outcome.last_modified_version() {
        log::info!("Library version: {}", version);
    }

    if outcome.is_not_modified() {
        log::info!("Not modified");
        return Ok(());
    }

    let output = match outcome {
        Outcome::Raw(mut raw) => raw.response_mut().text()?,
        Outcome::MultiWrite(response) => {
            for (index, failure) in response.errors() {
                log::warn!("Entity {} failed: {} {}", index, failure.code, failure.message);
            }
            serde_json::to_string_pretty(response.data())?
        }
        other => serde_json::to_string_pretty(&other.data().unwrap_or(Value::Null))?,
    };

    if let Some(file) = args.file {
        std::fs::write(&file, output)?;
        log::info!("Wrote response to '{}'", file);
    } else {
        println!("{}", output);
    }
    Ok(())
}
