//! On-chain settlement: redeeming resolved outcome tokens for collateral.
//!
//! After a market resolves, the winning side's tokens are redeemed directly
//! against the Conditional Tokens Framework contract —
//! `redeemPositions(collateralToken, parentCollectionId, conditionId,
//! indexSets=[1,2])` — crediting USDC back to the EOA. Unlike the merge
//! path used pre-resolution, this does not need proxy-wallet routing: CTF
//! pays out to whichever address holds the tokens.

use crate::models::market::Side;
use alloy_primitives::{keccak256, Address, B256, U256};
use alloy_rlp::{Encodable, Header};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{sol, SolCall};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

sol! {
    function redeemPositions(
        address collateralToken,
        bytes32 parentCollectionId,
        bytes32 conditionId,
        uint256[] indexSets
    );

    function payoutNumerators(bytes32 conditionId, uint256 index) external view returns (uint256);
}

const REDEEM_GAS_LIMIT: u64 = 300_000;
const RECEIPT_WAIT_SECS: u64 = 30;

pub struct SettlementClient {
    rpc_url: String,
    http: reqwest::Client,
    wallet: PrivateKeySigner,
    conditional_tokens: Address,
    collateral_token: Address,
    chain_id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<serde_json::Value>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TxReceipt {
    status: Option<String>,
    #[serde(rename = "gasUsed")]
    gas_used: Option<String>,
}

pub struct RedeemResult {
    pub tx_hash: String,
    pub gas_used: Option<String>,
}

impl SettlementClient {
    pub fn new(
        rpc_url: &str,
        wallet: PrivateKeySigner,
        conditional_tokens_address: &str,
        collateral_token_address: &str,
        chain_id: u64,
    ) -> Result<Self> {
        Ok(Self {
            rpc_url: rpc_url.to_string(),
            http: reqwest::Client::new(),
            wallet,
            conditional_tokens: parse_address(conditional_tokens_address)?,
            collateral_token: parse_address(collateral_token_address)?,
            chain_id,
        })
    }

    /// Redeems both outcome slots (`indexSets = [1, 2]`, i.e. YES and NO)
    /// for a resolved condition. Idempotent at the contract level: redeeming
    /// an already-redeemed position reverts, which the caller surfaces as
    /// an error and records via `record_claim_attempt`.
    pub async fn redeem_positions(&self, condition_id_hex: &str) -> Result<RedeemResult> {
        let cid_clean = condition_id_hex.trim_start_matches("0x");
        let cid_bytes = hex::decode(cid_clean).context("invalid condition_id hex")?;
        if cid_bytes.len() != 32 {
            bail!("condition_id must be 32 bytes, got {}", cid_bytes.len());
        }
        let condition_id = B256::from_slice(&cid_bytes);

        let calldata = redeemPositionsCall {
            collateralToken: self.collateral_token,
            parentCollectionId: B256::ZERO,
            conditionId: condition_id,
            indexSets: vec![U256::from(1), U256::from(2)],
        }
        .abi_encode();

        let nonce = self.get_nonce().await?;
        let gas_price = self.get_gas_price().await?;
        let to = self.conditional_tokens;
        let value: u128 = 0;

        let sign_rlp =
            rlp_encode_legacy_tx(nonce, gas_price, REDEEM_GAS_LIMIT, to, value, &calldata, Some(self.chain_id));
        let tx_hash = keccak256(&sign_rlp);

        let signature = self
            .wallet
            .sign_hash(&tx_hash)
            .await
            .map_err(|e| anyhow::anyhow!("signing failed: {e}"))?;
        let sig_bytes = signature.as_bytes();
        let recovery_id = sig_bytes[64];
        let v = self.chain_id * 2 + 35 + recovery_id as u64;
        let r = U256::from_be_slice(&sig_bytes[0..32]);
        let s = U256::from_be_slice(&sig_bytes[32..64]);

        let signed_rlp = rlp_encode_signed_legacy_tx(nonce, gas_price, REDEEM_GAS_LIMIT, to, value, &calldata, v, r, s);
        let raw_hex = format!("0x{}", hex::encode(&signed_rlp));

        let send_resp = self.rpc_call("eth_sendRawTransaction", serde_json::json!([raw_hex])).await?;
        let tx_hash_str = send_resp
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("no tx hash in response: {send_resp:?}"))?
            .to_string();

        info!("redeem tx sent: {condition_id_hex} tx={tx_hash_str}");

        let receipt = self.wait_for_receipt(&tx_hash_str, RECEIPT_WAIT_SECS).await?;
        let status = receipt.status.as_deref().unwrap_or("0x0");
        if status == "0x1" {
            info!("redeem confirmed: tx={tx_hash_str} gas={:?}", receipt.gas_used);
            Ok(RedeemResult { tx_hash: tx_hash_str, gas_used: receipt.gas_used })
        } else {
            bail!("redeem transaction reverted: tx={tx_hash_str}");
        }
    }

    /// Reads the CTF's recorded outcome for a resolved condition.
    /// `payoutNumerators(conditionId, 0)` is nonzero for YES, index 1 for
    /// NO — exactly one of the two is set once the oracle has reported.
    pub async fn winning_side(&self, condition_id_hex: &str) -> Result<Side> {
        let cid_clean = condition_id_hex.trim_start_matches("0x");
        let cid_bytes = hex::decode(cid_clean).context("invalid condition_id hex")?;
        if cid_bytes.len() != 32 {
            bail!("condition_id must be 32 bytes, got {}", cid_bytes.len());
        }
        let condition_id = B256::from_slice(&cid_bytes);

        let yes_numerator = self.read_payout_numerator(condition_id, 0).await?;
        if yes_numerator > U256::ZERO {
            return Ok(Side::Yes);
        }
        let no_numerator = self.read_payout_numerator(condition_id, 1).await?;
        if no_numerator > U256::ZERO {
            return Ok(Side::No);
        }
        bail!("condition {condition_id_hex} has no reported payout yet");
    }

    async fn read_payout_numerator(&self, condition_id: B256, index: u64) -> Result<U256> {
        let calldata = payoutNumeratorsCall { conditionId: condition_id, index: U256::from(index) }.abi_encode();
        let call_params = serde_json::json!({
            "to": format!("{:?}", self.conditional_tokens),
            "data": format!("0x{}", hex::encode(&calldata)),
        });
        let resp = self.rpc_call("eth_call", serde_json::json!([call_params, "latest"])).await?;
        let hex_result = resp.as_str().unwrap_or("0x0");
        let clean = hex_result.trim_start_matches("0x");
        if clean.is_empty() {
            return Ok(U256::ZERO);
        }
        Ok(U256::from_str_radix(clean, 16).unwrap_or(U256::ZERO))
    }

    pub async fn check_gas_balance(&self) -> Result<f64> {
        let eoa = self.wallet.address();
        let resp = self.rpc_call("eth_getBalance", serde_json::json!([format!("{:?}", eoa), "latest"])).await?;
        let hex_bal = resp.as_str().unwrap_or("0x0");
        let bal = u128::from_str_radix(hex_bal.trim_start_matches("0x"), 16).unwrap_or(0);
        Ok(bal as f64 / 1e18)
    }

    async fn rpc_call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let body = serde_json::json!({ "jsonrpc": "2.0", "method": method, "params": params, "id": 1 });
        let resp: JsonRpcResponse = self.http.post(&self.rpc_url).json(&body).send().await?.json().await?;
        if let Some(err) = resp.error {
            bail!("RPC error in {method}: {err:?}");
        }
        resp.result.ok_or_else(|| anyhow::anyhow!("no result in {method} response"))
    }

    async fn get_nonce(&self) -> Result<u64> {
        let eoa = self.wallet.address();
        let resp = self.rpc_call("eth_getTransactionCount", serde_json::json!([format!("{:?}", eoa), "pending"])).await?;
        let hex = resp.as_str().unwrap_or("0x0");
        Ok(u64::from_str_radix(hex.trim_start_matches("0x"), 16).unwrap_or(0))
    }

    async fn get_gas_price(&self) -> Result<u128> {
        let resp = self.rpc_call("eth_gasPrice", serde_json::json!([])).await?;
        let hex = resp.as_str().unwrap_or("0x0");
        let price = u128::from_str_radix(hex.trim_start_matches("0x"), 16).unwrap_or(30_000_000_000);
        Ok(price * 120 / 100)
    }

    async fn wait_for_receipt(&self, tx_hash: &str, max_secs: u64) -> Result<TxReceipt> {
        let start = tokio::time::Instant::now();
        loop {
            if start.elapsed().as_secs() > max_secs {
                warn!("timeout waiting for redeem receipt: {tx_hash}");
                bail!("timeout waiting for tx receipt: {tx_hash}");
            }
            match self.rpc_call("eth_getTransactionReceipt", serde_json::json!([tx_hash])).await {
                Ok(val) if !val.is_null() => {
                    let receipt: TxReceipt = serde_json::from_value(val)?;
                    return Ok(receipt);
                }
                _ => tokio::time::sleep(tokio::time::Duration::from_secs(2)).await,
            }
        }
    }
}

fn parse_address(s: &str) -> Result<Address> {
    let clean = s.trim_start_matches("0x");
    Ok(Address::from_slice(&hex::decode(clean)?))
}

fn rlp_encode_legacy_tx(
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    to: Address,
    value: u128,
    data: &[u8],
    chain_id: Option<u64>,
) -> Vec<u8> {
    let mut payload = Vec::new();
    nonce.encode(&mut payload);
    gas_price.encode(&mut payload);
    gas_limit.encode(&mut payload);
    to.encode(&mut payload);
    value.encode(&mut payload);
    data.encode(&mut payload);
    if let Some(cid) = chain_id {
        cid.encode(&mut payload);
        0u8.encode(&mut payload);
        0u8.encode(&mut payload);
    }
    let mut out = Vec::new();
    Header { list: true, payload_length: payload.len() }.encode(&mut out);
    out.extend_from_slice(&payload);
    out
}

fn rlp_encode_signed_legacy_tx(
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    to: Address,
    value: u128,
    data: &[u8],
    v: u64,
    r: U256,
    s: U256,
) -> Vec<u8> {
    let mut payload = Vec::new();
    nonce.encode(&mut payload);
    gas_price.encode(&mut payload);
    gas_limit.encode(&mut payload);
    to.encode(&mut payload);
    value.encode(&mut payload);
    data.encode(&mut payload);
    v.encode(&mut payload);
    r.encode(&mut payload);
    s.encode(&mut payload);
    let mut out = Vec::new();
    Header { list: true, payload_length: payload.len() }.encode(&mut out);
    out.extend_from_slice(&payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_condition_id() {
        let wallet = PrivateKeySigner::random();
        let client = SettlementClient::new(
            "http://localhost:8545",
            wallet,
            "4d97dcd97ec945f40cf65f87097ace5ea0476045",
            "2791bca1f2de4661ed88a30c99a7a9449aa84174",
            137,
        )
        .unwrap();
        let rt = tokio::runtime::Runtime::new().unwrap();
        let err = rt.block_on(client.redeem_positions("0x1234")).unwrap_err();
        assert!(err.to_string().contains("32 bytes"));
    }
}
