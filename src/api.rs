//! 快照导出 HTTP 接口
//!
//! 只读：价格表快照、比价表和套利机会列表。所有响应都禁用缓存。

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::{header, HeaderValue},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use log::info;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::core::types::Opportunity;
use crate::pairs::MatchedTables;
use crate::price_store::PriceStore;
use crate::snapshot::Published;

/// HTTP 层共享的只读句柄
#[derive(Clone)]
pub struct ApiState {
    pub prices: PriceStore,
    pub matched: Published<MatchedTables>,
    pub opportunities: Published<Vec<Opportunity>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NetworkQuery {
    pub network: Option<String>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/prices", get(get_prices))
        .route("/pairs", get(get_pairs))
        .route("/opportunities", get(get_opportunities))
        .layer(middleware::map_response(disable_caching))
        .with_state(state)
}

/// 启动 HTTP 服务，收到关闭信号后优雅退出
pub async fn serve(bind: &str, state: ApiState, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;
    info!("🎯 快照接口监听于 {}", bind);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
        .context("HTTP server error")?;

    info!("快照接口已停止");
    Ok(())
}

async fn disable_caching(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    response
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "prices": state.prices.len(),
        "price_writes": state.prices.total_writes(),
        "opportunities": state.opportunities.load().len(),
        "timestamp": Utc::now(),
    }))
}

async fn get_prices(
    State(state): State<ApiState>,
    Query(query): Query<NetworkQuery>,
) -> impl IntoResponse {
    let snapshot = state.prices.snapshot();
    match query.network {
        Some(network) => Json(snapshot.for_network(&network)),
        None => Json(snapshot),
    }
}

async fn get_pairs(
    State(state): State<ApiState>,
    Query(query): Query<NetworkQuery>,
) -> impl IntoResponse {
    let tables = state.matched.load();
    let tables: MatchedTables = match query.network {
        Some(network) => tables
            .get_key_value(&network)
            .map(|(name, table)| (name.clone(), table.clone()))
            .into_iter()
            .collect(),
        None => tables.as_ref().clone(),
    };
    Json(tables)
}

async fn get_opportunities(
    State(state): State<ApiState>,
    Query(query): Query<NetworkQuery>,
) -> impl IntoResponse {
    let opportunities = state.opportunities.load();
    let opportunities: Vec<Opportunity> = opportunities
        .iter()
        .filter(|o| query.network.as_deref().map_or(true, |network| o.network == network))
        .cloned()
        .collect();
    Json(opportunities)
}
