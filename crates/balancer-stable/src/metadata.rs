//! Decoding of persisted pool snapshots. A snapshot carries the pool's
//! reserves and tokens plus two embedded JSON documents: `extra` with the
//! state that changes between blocks and `staticExtra` with the immutable pool
//! configuration.

use {
    crate::{
        config::Config,
        pool::{Pool, PoolKind, decode_reserves},
        pools::{
            composable_stable::{
                self,
                FeeSchema,
                LastJoinExit,
                ProtocolFeePercentages,
                TokenRateCache,
            },
            stable,
        },
        serialization::HexOrDecimalU256,
        swap::Bfp,
    },
    alloy::primitives::{Address, B256, U256},
    anyhow::{Context, Result, bail, ensure},
    num::BigUint,
    serde::{Deserialize, Serialize},
    serde_with::{DisplayFromStr, serde_as},
    std::collections::BTreeMap,
};

/// Fee type keys of the protocol fee percentage cache.
const SWAP_FEE_TYPE: u64 = 0;
const YIELD_FEE_TYPE: u64 = 2;

#[serde_as]
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSnapshot {
    pub address: Address,
    #[serde(default)]
    pub exchange: String,
    #[serde(rename = "type", default)]
    pub pool_type: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde_as(as = "Vec<DisplayFromStr>")]
    pub reserves: Vec<BigUint>,
    pub tokens: Vec<SnapshotToken>,
    pub extra: String,
    pub static_extra: String,
    #[serde(default)]
    pub block_number: u64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SnapshotToken {
    pub address: Address,
    #[serde(default)]
    pub swappable: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoolTypeProbe {
    pool_type: String,
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StableExtra {
    #[serde_as(as = "HexOrDecimalU256")]
    amp: U256,
    #[serde_as(as = "HexOrDecimalU256")]
    swap_fee_percentage: U256,
    #[serde_as(as = "Vec<HexOrDecimalU256>")]
    scaling_factors: Vec<U256>,
    #[serde(default)]
    paused: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StableStaticExtra {
    pool_id: B256,
    vault: Address,
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComposableStableExtra {
    #[serde(default)]
    can_not_update_token_rates: bool,
    #[serde_as(as = "Vec<HexOrDecimalU256>")]
    scaling_factors: Vec<U256>,
    #[serde_as(as = "HexOrDecimalU256")]
    bpt_total_supply: U256,
    #[serde_as(as = "HexOrDecimalU256")]
    amp: U256,
    last_join_exit: LastJoinExit,
    rate_providers: Vec<String>,
    token_rate_caches: Vec<TokenRateCacheDto>,
    #[serde_as(as = "HexOrDecimalU256")]
    swap_fee_percentage: U256,
    #[serde_as(as = "BTreeMap<_, HexOrDecimalU256>")]
    #[serde(default)]
    protocol_fee_percentage_cache: BTreeMap<u64, U256>,
    #[serde(default)]
    is_token_exempt_from_yield_protocol_fee: Vec<bool>,
    #[serde(default)]
    is_exempt_from_yield_protocol_fee: bool,
    #[serde(default)]
    in_recovery_mode: bool,
    #[serde(default)]
    paused: bool,
}

/// Rate caches of tokens without a rate provider are all `null`.
#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenRateCacheDto {
    #[serde_as(as = "Option<HexOrDecimalU256>")]
    rate: Option<U256>,
    #[serde_as(as = "Option<HexOrDecimalU256>")]
    old_rate: Option<U256>,
    #[serde_as(as = "Option<HexOrDecimalU256>")]
    duration: Option<U256>,
    #[serde_as(as = "Option<HexOrDecimalU256>")]
    expires: Option<U256>,
}

impl From<TokenRateCacheDto> for TokenRateCache {
    fn from(cache: TokenRateCacheDto) -> Self {
        Self {
            rate: cache.rate.unwrap_or_default(),
            old_rate: cache.old_rate.unwrap_or_default(),
            duration: cache.duration.unwrap_or_default(),
            expires: cache.expires.unwrap_or_default(),
        }
    }
}

/// Rates of tokens with a provider divide balances, so their cache has to be
/// populated.
fn token_rate_cache(
    cache: TokenRateCacheDto,
    provider: Option<Address>,
) -> Result<TokenRateCache> {
    if let Some(provider) = provider {
        ensure!(
            cache.rate.is_some_and(|rate| !rate.is_zero()) && cache.old_rate.is_some(),
            "missing rate cache for rate provider {provider}"
        );
    }
    Ok(cache.into())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComposableStableStaticExtra {
    pool_id: B256,
    pool_type_ver: u64,
    bpt_index: usize,
    vault: Address,
}

impl PoolSnapshot {
    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data).context("invalid pool snapshot")
    }
}

/// Parses a rate provider address. Empty strings and the zero address both
/// mean the token has no rate provider.
fn rate_provider(provider: &str) -> Result<Option<Address>> {
    if provider.is_empty() {
        return Ok(None);
    }
    let address = provider
        .parse::<Address>()
        .with_context(|| format!("invalid rate provider {provider:?}"))?;
    Ok((!address.is_zero()).then_some(address))
}

impl Pool {
    pub fn from_snapshot(snapshot: &PoolSnapshot, config: &Config) -> Result<Self> {
        let tokens = snapshot
            .tokens
            .iter()
            .map(|token| token.address)
            .collect::<Vec<_>>();
        ensure!(
            snapshot.reserves.len() == tokens.len(),
            "pool {} has {} tokens but {} reserves",
            snapshot.address,
            tokens.len(),
            snapshot.reserves.len()
        );
        let reserves = decode_reserves(&snapshot.reserves)
            .with_context(|| format!("invalid reserves of pool {}", snapshot.address))?;

        let probe: PoolTypeProbe =
            serde_json::from_str(&snapshot.static_extra).context("invalid static extra")?;
        let pool = match probe.pool_type.as_str() {
            "ComposableStable" => composable_stable_pool(snapshot, tokens, reserves, config)?,
            "Stable" | "MetaStable" => stable_pool(snapshot, tokens, reserves, config)?,
            other => bail!("unsupported pool type {other:?}"),
        };
        tracing::debug!(
            pool = ?pool.address,
            pool_type = %probe.pool_type,
            block_number = pool.block_number,
            "decoded pool snapshot"
        );
        Ok(pool)
    }
}

fn scaling_factors(factors: &[U256], tokens: usize) -> Result<Vec<Bfp>> {
    ensure!(
        factors.len() == tokens,
        "expected {tokens} scaling factors but got {}",
        factors.len()
    );
    Ok(factors.iter().copied().map(Bfp::from_wei).collect())
}

fn stable_pool(
    snapshot: &PoolSnapshot,
    tokens: Vec<Address>,
    reserves: Vec<U256>,
    config: &Config,
) -> Result<Pool> {
    let extra: StableExtra =
        serde_json::from_str(&snapshot.extra).context("invalid stable pool extra")?;
    let static_extra: StableStaticExtra = serde_json::from_str(&snapshot.static_extra)
        .context("invalid stable pool static extra")?;

    let state = stable::PoolState {
        amplification_parameter: extra.amp,
        swap_fee: Bfp::from_wei(extra.swap_fee_percentage),
        scaling_factors: scaling_factors(&extra.scaling_factors, tokens.len())?,
    };

    Ok(Pool {
        address: snapshot.address,
        tokens,
        reserves,
        block_number: snapshot.block_number,
        vault: static_extra.vault,
        pool_id: static_extra.pool_id,
        paused: extra.paused,
        can_not_update_token_rates: false,
        dex_id: config.dex_id.clone(),
        swap_gas: config.swap_gas,
        kind: PoolKind::Stable(state),
    })
}

fn composable_stable_pool(
    snapshot: &PoolSnapshot,
    tokens: Vec<Address>,
    reserves: Vec<U256>,
    config: &Config,
) -> Result<Pool> {
    let extra: ComposableStableExtra =
        serde_json::from_str(&snapshot.extra).context("invalid composable stable pool extra")?;
    let static_extra: ComposableStableStaticExtra = serde_json::from_str(&snapshot.static_extra)
        .context("invalid composable stable pool static extra")?;

    ensure!(
        tokens.get(static_extra.bpt_index) == Some(&snapshot.address),
        "bpt index {} does not point at pool token {}",
        static_extra.bpt_index,
        snapshot.address
    );
    ensure!(
        extra.rate_providers.len() == tokens.len()
            && extra.token_rate_caches.len() == tokens.len(),
        "expected rate providers and caches for all {} tokens",
        tokens.len()
    );

    let fee_schema = FeeSchema::new(
        static_extra.pool_type_ver,
        extra.is_token_exempt_from_yield_protocol_fee,
        extra.is_exempt_from_yield_protocol_fee,
    );
    if let FeeSchema::V1 { exempt_tokens } = &fee_schema {
        ensure!(
            exempt_tokens.len() == tokens.len(),
            "expected yield fee exemptions for all {} tokens",
            tokens.len()
        );
    }

    let rate_providers = extra
        .rate_providers
        .iter()
        .map(|provider| rate_provider(provider))
        .collect::<Result<Vec<_>>>()?;
    let fee_percentage = |fee_type| {
        Bfp::from_wei(
            extra
                .protocol_fee_percentage_cache
                .get(&fee_type)
                .copied()
                .unwrap_or_default(),
        )
    };
    let state = composable_stable::PoolState {
        bpt_index: static_extra.bpt_index,
        amplification_parameter: extra.amp,
        swap_fee: Bfp::from_wei(extra.swap_fee_percentage),
        scaling_factors: scaling_factors(&extra.scaling_factors, tokens.len())?,
        bpt_total_supply: Bfp::from_wei(extra.bpt_total_supply),
        last_join_exit: extra.last_join_exit,
        token_rate_caches: extra
            .token_rate_caches
            .into_iter()
            .zip(&rate_providers)
            .map(|(cache, provider)| token_rate_cache(cache, *provider))
            .collect::<Result<_>>()?,
        rate_providers,
        protocol_fee_percentages: ProtocolFeePercentages {
            swap: fee_percentage(SWAP_FEE_TYPE),
            yield_: fee_percentage(YIELD_FEE_TYPE),
        },
        fee_schema,
        pool_type_version: static_extra.pool_type_ver,
        in_recovery_mode: extra.in_recovery_mode,
    };

    Ok(Pool {
        address: snapshot.address,
        tokens,
        reserves,
        block_number: snapshot.block_number,
        vault: static_extra.vault,
        pool_id: static_extra.pool_id,
        paused: extra.paused,
        can_not_update_token_rates: extra.can_not_update_token_rates,
        dex_id: config.dex_id.clone(),
        swap_gas: config.swap_gas,
        kind: PoolKind::ComposableStable(state),
    })
}
