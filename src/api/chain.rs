use actix_web::{HttpResponse, get, web};
use log::warn;

use super::models::{
    AppState, BlockResponse, BlockSummary, BlocksResponse, MerkleProofResponse, PageQuery,
    ValidateResponse,
};
use crate::error::ChainError;

const DEFAULT_PER_PAGE: usize = 10;
const MAX_PER_PAGE: usize = 100;

/// Newest-first page of block summaries.
#[get("/blocks")]
pub async fn list_blocks(
    state: web::Data<AppState>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ChainError> {
    let page = query.page.unwrap_or(1);
    let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE);
    if page == 0 || per_page == 0 || per_page > MAX_PER_PAGE {
        return Err(ChainError::Validation(format!(
            "page must be >= 1 and per_page within 1..={MAX_PER_PAGE}"
        )));
    }

    let bc = state.chain();
    let total_blocks = bc.len();
    let blocks = bc
        .blocks()
        .iter()
        .rev()
        .skip((page - 1).saturating_mul(per_page))
        .take(per_page)
        .map(BlockSummary::from)
        .collect();

    Ok(HttpResponse::Ok().json(BlocksResponse {
        success: true,
        blocks,
        page,
        per_page,
        total_blocks,
        total_pages: total_blocks.div_ceil(per_page),
    }))
}

#[get("/block/{index}")]
pub async fn get_block(
    state: web::Data<AppState>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ChainError> {
    let index = path.into_inner();
    let bc = state.chain();
    let block = bc
        .get_block(index)
        .ok_or_else(|| ChainError::NotFound(format!("block {index}")))?;
    Ok(HttpResponse::Ok().json(BlockResponse {
        success: true,
        block,
    }))
}

/// Inclusion proof of `txid` against the block's Merkle root.
#[get("/block/{index}/merkle_proof/{txid}")]
pub async fn merkle_proof(
    state: web::Data<AppState>,
    path: web::Path<(u64, String)>,
) -> Result<HttpResponse, ChainError> {
    let (index, txid) = path.into_inner();
    let bc = state.chain();
    let block = bc
        .get_block(index)
        .ok_or_else(|| ChainError::NotFound(format!("block {index}")))?;
    let proof = block
        .merkle_tree()
        .proof(&txid)
        .ok_or_else(|| ChainError::NotFound(format!("transaction {txid} in block {index}")))?;
    let valid = proof.verify() && proof.merkle_root == block.merkle_root;

    Ok(HttpResponse::Ok().json(MerkleProofResponse {
        success: true,
        block_index: index,
        proof,
        valid,
    }))
}

/// Validate the whole chain.
#[get("/validate_chain")]
pub async fn validate_chain(state: web::Data<AppState>) -> HttpResponse {
    let bc = state.chain();
    let valid = bc.is_valid_chain();
    if !valid {
        warn!("GET /validate_chain - chain failed validation");
    }
    HttpResponse::Ok().json(ValidateResponse {
        valid,
        length: bc.len(),
        difficulty: bc.next_difficulty(),
    })
}
