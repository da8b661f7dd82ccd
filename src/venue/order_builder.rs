use crate::models::order::{OrderIntent, OrderSide, TimeInForce};
use alloy_primitives::{keccak256, Address, U256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{sol, Eip712Domain, SolStruct};
use anyhow::Result;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

// `sol!`'s generated type hash must match the venue's on-chain CTF Exchange
// struct exactly: `Order(uint256 salt,address maker,...)`.
sol! {
    #[derive(Debug)]
    struct Order {
        uint256 salt;
        address maker;
        address signer;
        address taker;
        uint256 tokenId;
        uint256 makerAmount;
        uint256 takerAmount;
        uint256 expiration;
        uint256 nonce;
        uint256 feeRateBps;
        uint8 side;
        uint8 signatureType;
    }
}

const CTF_EXCHANGE: &str = "0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E";
const NEG_RISK_CTF_EXCHANGE: &str = "0xC5d563A36AE78145C45a50134d48A1215220f80a";
const PROXY_WALLET_FACTORY: &str = "0xaB45c5A4B0c941a2F231C04C3f49182e1A254052";
const PROXY_INIT_CODE_HASH: [u8; 32] = [
    0xd2, 0x1d, 0xf8, 0xdc, 0x65, 0x88, 0x0a, 0x86, 0x06, 0xf0, 0x9f, 0xe0, 0xce, 0x3d, 0xf9, 0xb8,
    0x86, 0x92, 0x87, 0xab, 0x0b, 0x05, 0x8b, 0xe0, 0x5a, 0xa9, 0xe8, 0xaf, 0x63, 0x30, 0xa0, 0x0b,
];

const DOMAIN_NAME: &str = "Polymarket CTF Exchange";
const DOMAIN_VERSION: &str = "1";

/// Builds and signs orders for CLOB submission (EIP-712 typed data over the
/// venue's CTF Exchange contract).
pub struct OrderBuilder {
    chain_id: u64,
    signer: PrivateKeySigner,
    maker_address: Address,
    funder_address: Option<Address>,
    signature_type: u8,
    use_neg_risk: bool,
    fee_rate_bps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedOrder {
    pub salt: u64,
    pub maker: String,
    pub signer: String,
    pub taker: String,
    pub token_id: String,
    pub maker_amount: String,
    pub taker_amount: String,
    pub expiration: String,
    pub nonce: String,
    pub fee_rate_bps: String,
    pub side: String,
    pub signature_type: u8,
    pub signature: String,
}

impl OrderBuilder {
    pub fn new(
        chain_id: u64,
        private_key: String,
        funder_address: Option<String>,
        signature_type: u8,
    ) -> Self {
        let signer = if private_key.is_empty() {
            PrivateKeySigner::random()
        } else {
            let key_hex = private_key.strip_prefix("0x").unwrap_or(&private_key);
            key_hex.parse::<PrivateKeySigner>().unwrap_or_else(|_| {
                tracing::warn!("invalid private key, using random signer (dry-run mode)");
                PrivateKeySigner::random()
            })
        };

        let maker_address = signer.address();

        let funder = if signature_type == 1 {
            let explicit = funder_address.as_ref().and_then(|f| f.parse::<Address>().ok());
            let salt = keccak256(maker_address.as_slice());
            let factory = PROXY_WALLET_FACTORY.parse::<Address>().unwrap();
            let init_hash = alloy_primitives::B256::from(PROXY_INIT_CODE_HASH);
            let mut create2_input = Vec::with_capacity(85);
            create2_input.push(0xff);
            create2_input.extend_from_slice(factory.as_slice());
            create2_input.extend_from_slice(salt.as_slice());
            create2_input.extend_from_slice(init_hash.as_slice());
            let derived_hash = keccak256(&create2_input);
            let derived = Address::from_slice(&derived_hash[12..]);
            if let Some(exp) = explicit {
                if exp != derived {
                    tracing::warn!("funder mismatch: configured {:?}, derived {:?} — using derived", exp, derived);
                }
            }
            Some(derived)
        } else {
            funder_address.as_ref().and_then(|f| f.parse::<Address>().ok())
        };

        Self {
            chain_id,
            signer,
            maker_address,
            funder_address: funder,
            signature_type,
            use_neg_risk: false,
            fee_rate_bps: 0,
        }
    }

    pub fn set_neg_risk(&mut self, neg_risk: bool) {
        self.use_neg_risk = neg_risk;
    }

    pub fn set_fee_rate_bps(&mut self, bps: u32) {
        self.fee_rate_bps = bps;
    }

    pub fn address(&self) -> Address {
        self.maker_address
    }

    /// Sign an `OrderIntent` already canonicalized by `venue::canonicalize`.
    ///
    /// Maker/taker micro-unit amounts follow the venue's tick-size-0.01
    /// rounding table: limit BUY maker=USDC(4dec)/taker=shares(2dec), limit
    /// SELL maker=shares(2dec)/taker=USDC(4dec). FOK legs use the same rule
    /// as GTC; only the submitted time-in-force differs.
    pub async fn build(&self, intent: &OrderIntent) -> Result<SignedOrder> {
        let price_f64 = intent.price.to_string().parse::<f64>().unwrap_or(0.0);
        let size_f64 = intent.size.to_string().parse::<f64>().unwrap_or(0.0);
        let is_sell = matches!(intent.order_side, OrderSide::Sell);

        let (maker_div, taker_div) = if is_sell { (10_000u64, 100u64) } else { (100u64, 10_000u64) };

        let size_trunc = (size_f64 * 100.0).floor() / 100.0;
        let (maker_amount, taker_amount) = match intent.order_side {
            OrderSide::Buy => {
                let usdc_raw = (price_f64 * size_trunc * 1_000_000.0).round() as u64;
                let usdc = usdc_raw.div_ceil(maker_div) * maker_div;
                let tokens_raw = (size_trunc * 1_000_000.0).round() as u64;
                let tokens = (tokens_raw / taker_div) * taker_div;
                (usdc, tokens)
            }
            OrderSide::Sell => {
                let tokens_raw = (size_trunc * 1_000_000.0).round() as u64;
                let tokens = tokens_raw.div_ceil(maker_div) * maker_div;
                let usdc_raw = (price_f64 * size_trunc * 1_000_000.0).round() as u64;
                let usdc = (usdc_raw / taker_div) * taker_div;
                (tokens, usdc)
            }
        };

        let side: u8 = match intent.order_side {
            OrderSide::Buy => 0,
            OrderSide::Sell => 1,
        };

        let salt: u64 = rand::thread_rng().gen::<u64>() & ((1u64 << 53) - 1);

        let token_id = if intent.token_id.starts_with("0x") || intent.token_id.starts_with("0X") {
            U256::from_str_radix(&intent.token_id[2..], 16).unwrap_or(U256::ZERO)
        } else {
            U256::from_str_radix(&intent.token_id, 10).unwrap_or(U256::ZERO)
        };

        let maker = self.funder_address.unwrap_or(self.maker_address);
        let expiration = match intent.time_in_force {
            TimeInForce::GTC => 0u64,
            TimeInForce::FOK => 0u64,
        };

        let exchange_addr = if self.use_neg_risk { NEG_RISK_CTF_EXCHANGE } else { CTF_EXCHANGE };
        let verifying_contract = exchange_addr.parse::<Address>().unwrap_or(Address::ZERO);
        let domain = Eip712Domain {
            name: Some(DOMAIN_NAME.into()),
            version: Some(DOMAIN_VERSION.into()),
            chain_id: Some(U256::from(self.chain_id)),
            verifying_contract: Some(verifying_contract),
            salt: None,
        };

        let sol_order = Order {
            salt: U256::from(salt),
            maker,
            signer: self.maker_address,
            taker: Address::ZERO,
            tokenId: token_id,
            makerAmount: U256::from(maker_amount),
            takerAmount: U256::from(taker_amount),
            expiration: U256::from(expiration),
            nonce: U256::ZERO,
            feeRateBps: U256::from(self.fee_rate_bps),
            side,
            signatureType: self.signature_type,
        };

        let digest = sol_order.eip712_signing_hash(&domain);
        let signature = self.signer.sign_hash(&digest).await?;
        let sig_hex = format!("0x{}", hex::encode(signature.as_bytes()));

        let side_str = match intent.order_side {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        };

        debug!(
            "signed order token={} side={side_str} maker_amt={maker_amount} taker_amt={taker_amount}",
            intent.token_id
        );

        Ok(SignedOrder {
            salt,
            maker: format!("{:?}", maker),
            signer: format!("{:?}", self.maker_address),
            taker: format!("{:?}", Address::ZERO),
            token_id: intent.token_id.clone(),
            maker_amount: maker_amount.to_string(),
            taker_amount: taker_amount.to_string(),
            expiration: expiration.to_string(),
            nonce: "0".to_string(),
            fee_rate_bps: self.fee_rate_bps.to_string(),
            side: side_str.to_string(),
            signature_type: self.signature_type,
            signature: sig_hex,
        })
    }
}

/// Iteratively canonicalizes `(price, size)` so that both have at most two
/// decimal places and `price * size` has at most four, per spec.md §4.1.
/// Rounds toward zero; shrinks `size` by one cent-unit at a time, bounded so
/// it never loops unboundedly on a pathological input.
pub fn canonicalize(price: Decimal, size: Decimal) -> (Decimal, Decimal) {
    use rust_decimal::RoundingStrategy;
    let cent = Decimal::new(1, 2);
    let price = price.round_dp_with_strategy(2, RoundingStrategy::ToZero);
    let mut size = size.round_dp_with_strategy(2, RoundingStrategy::ToZero);
    const MAX_ITERATIONS: u32 = 64;
    for _ in 0..MAX_ITERATIONS {
        let product = price * size;
        if product.round_dp(4) == product {
            break;
        }
        size -= cent;
        if size <= Decimal::ZERO {
            size = Decimal::ZERO;
            break;
        }
    }
    (price, size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn canonicalize_is_idempotent() {
        let (p1, s1) = canonicalize(dec!(0.405), dec!(10.5263));
        let (p2, s2) = canonicalize(p1, s1);
        assert_eq!((p1, s1), (p2, s2));
        assert_eq!((p1 * s1).round_dp(4), p1 * s1);
    }

    #[test]
    fn canonicalize_preserves_already_clean_values() {
        let (p, s) = canonicalize(dec!(0.40), dec!(10.00));
        assert_eq!(p, dec!(0.40));
        assert_eq!(s, dec!(10.00));
    }
}
