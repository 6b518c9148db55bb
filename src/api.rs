use actix_web::{HttpResponse, Result, http::StatusCode, web};
use chrono::Local;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};

use crate::storage::ArtifactInfo;
use crate::store::DocumentStore;

const STOCK_COLUMN: &str = "Stock Symbol";
const STATS_SAMPLE_FILES: usize = 5;
const STOCK_HISTORY_FILES: usize = 10;
const SAMPLE_STOCKS: usize = 10;

static DATE_IN_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").unwrap());

pub type Record = Map<String, Value>;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
}

#[derive(Debug, Deserialize)]
pub struct DataQuery {
    pub limit: Option<usize>,
    pub stock: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LatestQuery {
    #[serde(default = "default_latest_limit")]
    pub limit: usize,
}

fn default_latest_limit() -> usize {
    50
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FilesResponse {
    pub success: bool,
    pub files: Vec<ArtifactInfo>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct DataResponse {
    pub success: bool,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub records: usize,
    pub data: Vec<Record>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub total_files: usize,
    pub total_records: usize,
    pub latest_date: Option<String>,
    pub oldest_date: Option<String>,
    pub unique_stocks: usize,
    pub sample_stocks: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StockResponse {
    pub success: bool,
    pub stock_symbol: String,
    pub records: usize,
    pub data: Vec<Record>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/health", web::get().to(health_check))
        .route("/api/files", web::get().to(list_files))
        .route("/api/data/{filename}", web::get().to(get_data))
        .route("/api/latest", web::get().to(get_latest))
        .route("/api/stats", web::get().to(get_stats))
        .route("/api/stock/{symbol}", web::get().to(get_stock_data));
}

fn error_response(status: StatusCode, message: impl Into<String>) -> HttpResponse {
    HttpResponse::build(status).json(serde_json::json!({
        "success": false,
        "error": message.into(),
    }))
}

fn internal_error(e: anyhow::Error) -> HttpResponse {
    log::error!("Request failed: {:#}", e);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e))
}

/// `YYYY-MM-DD` part of an artifact name.
pub fn date_from_name(name: &str) -> Option<String> {
    DATE_IN_NAME.find(name).map(|m| m.as_str().to_string())
}

/// Parses an artifact into JSON records: empty cells become `null`,
/// numeric cells become numbers.
pub fn parse_records(content: &str) -> anyhow::Result<Vec<Record>> {
    let mut reader = csv::Reader::from_reader(content.as_bytes());
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let record: Record = headers
            .iter()
            .zip(row.iter())
            .map(|(column, cell)| (column.to_string(), cell_value(cell)))
            .collect();
        records.push(record);
    }
    Ok(records)
}

fn cell_value(cell: &str) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    if let Ok(n) = cell.parse::<i64>() {
        return Value::from(n);
    }
    match cell.parse::<f64>() {
        Ok(n) if n.is_finite() => Value::from(n),
        _ => Value::String(cell.to_string()),
    }
}

fn matches_stock(record: &Record, symbol: &str) -> bool {
    match record.get(STOCK_COLUMN) {
        Some(Value::String(s)) => s.eq_ignore_ascii_case(symbol),
        Some(Value::Number(n)) => n.to_string().eq_ignore_ascii_case(symbol),
        _ => false,
    }
}

/// Newest first.
fn newest(mut files: Vec<ArtifactInfo>, count: usize) -> Vec<ArtifactInfo> {
    files.sort_by(|a, b| b.name.cmp(&a.name));
    files.truncate(count);
    files
}

pub async fn index() -> Result<HttpResponse> {
    let html = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Floor Sheet API</title>
    <style>
        body { font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif; max-width: 900px; margin: 40px auto; color: #333; }
        code { background: #2d3748; color: #e2e8f0; padding: 2px 8px; border-radius: 4px; }
        li { margin: 10px 0; }
    </style>
</head>
<body>
    <h1>Floor Sheet API</h1>
    <ul>
        <li><code>GET /api/files</code> list all available CSV files</li>
        <li><code>GET /api/data/&lt;filename&gt;?limit=&amp;stock=</code> records of one file</li>
        <li><code>GET /api/latest?limit=</code> most recent floor sheet</li>
        <li><code>GET /api/stats</code> summary of the most recent files</li>
        <li><code>GET /api/stock/&lt;symbol&gt;</code> trades of one stock across recent files</li>
        <li><code>GET /health</code> health check</li>
    </ul>
</body>
</html>
"#;

    Ok(HttpResponse::Ok().content_type("text/html").body(html))
}

pub async fn health_check() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": Local::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

pub async fn list_files(state: web::Data<AppState>) -> Result<HttpResponse> {
    match state.store.list().await {
        Ok(files) => Ok(HttpResponse::Ok().json(FilesResponse {
            success: true,
            count: files.len(),
            files,
        })),
        Err(e) => Ok(internal_error(e)),
    }
}

pub async fn get_data(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<DataQuery>,
) -> Result<HttpResponse> {
    let mut filename = path.into_inner();
    if !filename.ends_with(".csv") {
        filename.push_str(".csv");
    }

    let content = match state.store.fetch(&filename).await {
        Ok(Some(content)) => content,
        Ok(None) => return Ok(error_response(StatusCode::NOT_FOUND, "File not found")),
        Err(e) => return Ok(internal_error(e)),
    };

    let mut data = match parse_records(&content) {
        Ok(data) => data,
        Err(e) => return Ok(internal_error(e)),
    };

    if let Some(stock) = &query.stock {
        data.retain(|record| matches_stock(record, stock));
    }
    if let Some(limit) = query.limit {
        data.truncate(limit);
    }

    Ok(HttpResponse::Ok().json(DataResponse {
        success: true,
        date: None,
        records: data.len(),
        filename,
        data,
    }))
}

pub async fn get_latest(
    state: web::Data<AppState>,
    query: web::Query<LatestQuery>,
) -> Result<HttpResponse> {
    let files = match state.store.list().await {
        Ok(files) => files,
        Err(e) => return Ok(internal_error(e)),
    };
    let Some(latest) = newest(files, 1).pop() else {
        return Ok(error_response(StatusCode::NOT_FOUND, "No files found"));
    };

    let content = match state.store.fetch(&latest.name).await {
        Ok(Some(content)) => content,
        Ok(None) => {
            return Ok(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Could not read latest file",
            ));
        }
        Err(e) => return Ok(internal_error(e)),
    };

    let mut data = match parse_records(&content) {
        Ok(data) => data,
        Err(e) => return Ok(internal_error(e)),
    };
    data.truncate(query.limit);

    Ok(HttpResponse::Ok().json(DataResponse {
        success: true,
        date: date_from_name(&latest.name),
        records: data.len(),
        filename: latest.name,
        data,
    }))
}

pub async fn get_stats(state: web::Data<AppState>) -> Result<HttpResponse> {
    let files = match state.store.list().await {
        Ok(files) => files,
        Err(e) => return Ok(internal_error(e)),
    };
    if files.is_empty() {
        return Ok(error_response(StatusCode::NOT_FOUND, "No files found"));
    }
    let total_files = files.len();

    let mut total_records = 0;
    let mut dates = Vec::new();
    let mut stocks = BTreeSet::new();

    for file in newest(files, STATS_SAMPLE_FILES) {
        let content = match state.store.fetch(&file.name).await {
            Ok(Some(content)) => content,
            Ok(None) => continue,
            Err(e) => return Ok(internal_error(e)),
        };
        let records = match parse_records(&content) {
            Ok(records) => records,
            Err(e) => {
                log::warn!("Skipping unreadable file {}: {:#}", file.name, e);
                continue;
            }
        };

        total_records += records.len();
        dates.extend(date_from_name(&file.name));
        stocks.extend(
            records
                .iter()
                .filter_map(|r| r.get(STOCK_COLUMN))
                .filter_map(|v| v.as_str().map(str::to_string)),
        );
    }

    Ok(HttpResponse::Ok().json(StatsResponse {
        success: true,
        total_files,
        total_records,
        latest_date: dates.iter().max().cloned(),
        oldest_date: dates.iter().min().cloned(),
        unique_stocks: stocks.len(),
        sample_stocks: stocks.into_iter().take(SAMPLE_STOCKS).collect(),
    }))
}

pub async fn get_stock_data(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let symbol = path.into_inner().to_uppercase();

    let files = match state.store.list().await {
        Ok(files) => files,
        Err(e) => return Ok(internal_error(e)),
    };
    if files.is_empty() {
        return Ok(error_response(StatusCode::NOT_FOUND, "No files found"));
    }

    let mut data = Vec::new();
    for file in newest(files, STOCK_HISTORY_FILES) {
        let content = match state.store.fetch(&file.name).await {
            Ok(Some(content)) => content,
            Ok(None) => continue,
            Err(e) => return Ok(internal_error(e)),
        };
        let Ok(records) = parse_records(&content) else {
            log::warn!("Skipping unreadable file {}", file.name);
            continue;
        };

        let date = date_from_name(&file.name).map_or(Value::Null, Value::String);
        data.extend(
            records
                .into_iter()
                .filter(|r| matches_stock(r, &symbol))
                .map(|mut r| {
                    r.insert("Date".to_string(), date.clone());
                    r
                }),
        );
    }

    Ok(HttpResponse::Ok().json(StockResponse {
        success: true,
        stock_symbol: symbol,
        records: data.len(),
        data,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ArtifactStore;
    use crate::store::LocalStore;
    use actix_web::{App, test};

    const HEADER: &str = "SN,Contract No.,Stock Symbol,Buyer,Seller,Quantity,Rate (Rs),Amount (Rs)\n";

    fn write_day(dir: &std::path::Path, date: &str, rows: &[&str]) {
        let mut content = HEADER.to_string();
        for row in rows {
            content.push_str(row);
            content.push('\n');
        }
        std::fs::write(dir.join(format!("floorsheet_{date}.csv")), content).unwrap();
    }

    fn state(dir: &std::path::Path) -> web::Data<AppState> {
        web::Data::new(AppState {
            store: Arc::new(LocalStore::new(ArtifactStore::new(dir, "floorsheet"))),
        })
    }

    fn fixture() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        write_day(
            tmp.path(),
            "2025-06-24",
            &["1,C1,NABIL,42,58,10,500,5000", "2,C2,ALBSL,42,58,20,250.5,5010"],
        );
        write_day(
            tmp.path(),
            "2025-06-25",
            &[
                "1,C3,nabil,42,58,10,510,5100",
                "2,C4,HIDCL,42,58,5,,",
                "3,C5,NABIL,42,58,1,520,520",
            ],
        );
        tmp
    }

    #[::core::prelude::v1::test]
    fn test_parse_records() {
        let records = parse_records(&format!("{HEADER}1,C1,NABIL,42,58,10,250.5,\n")).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["Stock Symbol"], Value::from("NABIL"));
        assert_eq!(records[0]["Quantity"], Value::from(10));
        assert_eq!(records[0]["Rate (Rs)"], Value::from(250.5));
        assert_eq!(records[0]["Amount (Rs)"], Value::Null);
    }

    #[::core::prelude::v1::test]
    fn test_date_from_name() {
        assert_eq!(
            date_from_name("nepal_stock_floorsheet_2025-06-25.csv").as_deref(),
            Some("2025-06-25")
        );
        assert_eq!(date_from_name("notes.csv"), None);
    }

    #[actix_web::test]
    async fn test_list_files() {
        let tmp = fixture();
        let app = test::init_service(App::new().app_data(state(tmp.path())).configure(configure)).await;

        let req = test::TestRequest::get().uri("/api/files").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["count"], 2);
        assert_eq!(body["files"][0]["name"], "floorsheet_2025-06-24.csv");
    }

    #[actix_web::test]
    async fn test_get_data_filters_and_limits() {
        let tmp = fixture();
        let app = test::init_service(App::new().app_data(state(tmp.path())).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/api/data/floorsheet_2025-06-25?stock=NaBiL&limit=1")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["filename"], "floorsheet_2025-06-25.csv");
        assert_eq!(body["records"], 1);
        assert_eq!(body["data"][0]["Contract No."], "C3");
    }

    #[actix_web::test]
    async fn test_get_data_missing_file() {
        let tmp = fixture();
        let app = test::init_service(App::new().app_data(state(tmp.path())).configure(configure)).await;

        let req = test::TestRequest::get().uri("/api/data/floorsheet_1999-01-01.csv").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_latest() {
        let tmp = fixture();
        let app = test::init_service(App::new().app_data(state(tmp.path())).configure(configure)).await;

        let req = test::TestRequest::get().uri("/api/latest?limit=2").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["filename"], "floorsheet_2025-06-25.csv");
        assert_eq!(body["date"], "2025-06-25");
        assert_eq!(body["records"], 2);
        assert_eq!(body["data"][1]["Rate (Rs)"], Value::Null);
    }

    #[actix_web::test]
    async fn test_stats() {
        let tmp = fixture();
        let app = test::init_service(App::new().app_data(state(tmp.path())).configure(configure)).await;

        let req = test::TestRequest::get().uri("/api/stats").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total_files"], 2);
        assert_eq!(body["total_records"], 5);
        assert_eq!(body["latest_date"], "2025-06-25");
        assert_eq!(body["oldest_date"], "2025-06-24");
        assert_eq!(body["unique_stocks"], 4);
    }

    #[actix_web::test]
    async fn test_stock_history() {
        let tmp = fixture();
        let app = test::init_service(App::new().app_data(state(tmp.path())).configure(configure)).await;

        let req = test::TestRequest::get().uri("/api/stock/nabil").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["stock_symbol"], "NABIL");
        assert_eq!(body["records"], 3);
        assert_eq!(body["data"][0]["Date"], "2025-06-25");
        assert_eq!(body["data"][2]["Date"], "2025-06-24");
    }

    #[actix_web::test]
    async fn test_no_files() {
        let tmp = tempfile::tempdir().unwrap();
        let app = test::init_service(App::new().app_data(state(tmp.path())).configure(configure)).await;

        let req = test::TestRequest::get().uri("/api/latest").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
