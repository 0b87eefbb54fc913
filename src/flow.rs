use std::{future::Future, time::Duration};

use alloy::primitives::{Address, TxHash, U256};
use rand::{thread_rng, Rng};

use crate::{
    chain::ChainReader,
    config::Config,
    error::{BuildError, FlowError, InputError, Step},
    locator::{EventLocator, SwapEvent, SWAP_EVENT_SCHEMA},
    query::{Callback, CompiledQuery, ProtocolVersion, QueryAssembler, QueryOptions, QueryRequest},
    submit::{callback_selector, ClaimSubmission, ClaimSubmitter},
    subquery::{header, receipt, tx, HeaderField, TxField, TxType},
};

/// Everything a flow run needs to know, built once at startup.
pub struct FlowContext {
    pub claimer: Address,
    pub chain_id: u64,
    pub config: Config,
}

pub struct PreparedClaim {
    pub event: SwapEvent,
    pub compiled: CompiledQuery,
    pub fee: U256,
}

pub struct ClaimOutcome {
    pub prepared: PreparedClaim,
    pub tx_hash: TxHash,
}

/// The declarations proving the claimer received a swap: the log is a swap,
/// its recipient, the block it landed in, and the contract it called.
pub fn swap_declarations(
    assembler: &mut QueryAssembler,
    event: &SwapEvent,
    version: ProtocolVersion,
) {
    let swap_log = |topic| {
        receipt(event.tx_hash).log(event.log_idx).topic(topic).event_schema(SWAP_EVENT_SCHEMA)
    };
    assembler.append(swap_log(0));
    assembler.append(swap_log(2));
    assembler.append(receipt(event.tx_hash).block_number());

    let to = tx(event.tx_hash).field(TxField::To);
    match version {
        ProtocolVersion::V2Beta => assembler.append(to.tx_type(TxType::Eip1559)),
        ProtocolVersion::V2 => assembler.append(to),
    }
}

/// Callback into the airdrop contract, carrying the claimer as extra data.
pub fn claim_callback(airdrop: Address, claimer: Address, version: ProtocolVersion) -> Callback {
    let callback = Callback::new(airdrop, claimer.into_word());
    match version {
        ProtocolVersion::V2Beta => callback.with_function_selector(callback_selector()),
        ProtocolVersion::V2 => callback,
    }
}

/// Assembles the claim query for `event`. `salt_block` adds a header
/// subquery for that block so the same swap can be queried again.
pub fn assemble_claim_query(
    ctx: &FlowContext,
    event: &SwapEvent,
    salt_block: Option<u64>,
) -> Result<QueryRequest, InputError> {
    let version = ctx.config.protocol_version;
    let mut options = QueryOptions::new(version, ctx.chain_id);
    options.fees = ctx.config.fees();
    if version == ProtocolVersion::V2 {
        options.refundee = Some(ctx.claimer);
    }

    let mut assembler = QueryAssembler::new(options);
    swap_declarations(&mut assembler, event, version);
    if let Some(block_number) = salt_block {
        assembler.append(header(block_number).field(HeaderField::Number));
    }
    assembler.set_callback(claim_callback(ctx.config.airdrop_contract, ctx.claimer, version));

    assembler.finalize()
}

async fn timed<T, E>(
    step: Step,
    timeout: Duration,
    future: impl Future<Output = Result<T, E>>,
) -> Result<T, FlowError>
where
    FlowError: From<E>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result.map_err(FlowError::from),
        Err(_) => Err(FlowError::Timeout { step, timeout }),
    }
}

/// Locate, assemble, validate, build and price the claim without sending it.
pub async fn prepare_claim(
    ctx: &FlowContext,
    locator: &impl EventLocator,
    chain: &impl ChainReader,
) -> Result<PreparedClaim, FlowError> {
    let step_timeout = ctx.config.step_timeout();

    let raw_event = timed(Step::Lookup, step_timeout, async {
        locator.find_latest_swap(ctx.claimer).await.map_err(FlowError::Lookup)
    })
    .await?;
    let event = SwapEvent::try_from(raw_event.ok_or(InputError::NoMatchingEvent(ctx.claimer))?)?;
    tracing::info!(
        "Found swap {} in block {} (log {})",
        event.tx_hash,
        event.block_height,
        event.log_idx
    );

    let salt_block = if ctx.config.inject_random_header {
        let latest = timed(Step::Build, step_timeout, async {
            chain.latest_block_number().await.map_err(BuildError::Chain)
        })
        .await?;
        Some(thread_rng().gen_range(0..=latest))
    } else {
        None
    };

    let request = assemble_claim_query(ctx, &event, salt_block)?;

    match timed(Step::Validation, step_timeout, request.validate(chain)).await {
        Ok(()) => tracing::info!("Query is valid"),
        Err(e) if ctx.config.strict_validation => return Err(e),
        Err(e) => tracing::warn!("Continuing with a query that failed validation: {e}"),
    }

    let compiled = timed(Step::Build, step_timeout, request.build(chain)).await?;
    let fee = compiled.calculate_fee()?;

    tracing::info!("dataQueryHash: {}", compiled.data_query_hash);
    tracing::info!("queryHash: {}", compiled.query_hash);
    tracing::info!("Fee: {fee} wei");

    Ok(PreparedClaim { event, compiled, fee })
}

/// Runs `work` until it finishes or `cancel` resolves, whichever is first.
/// Cancellation is reported as [`FlowError::Cancelled`], never as the failure
/// of the step that was interrupted.
pub async fn cancellable<T>(
    work: impl Future<Output = Result<T, FlowError>>,
    cancel: impl Future,
) -> Result<T, FlowError> {
    tokio::select! {
        biased;
        _ = cancel => {
            tracing::warn!("Cancelled");
            Err(FlowError::Cancelled)
        }
        result = work => result,
    }
}

/// Full claim: prepare, then submit once and wait for the receipt.
pub async fn run_claim(
    ctx: &FlowContext,
    locator: &impl EventLocator,
    chain: &impl ChainReader,
    submitter: &impl ClaimSubmitter,
) -> Result<ClaimOutcome, FlowError> {
    let prepared = prepare_claim(ctx, locator, chain).await?;
    let submission = ClaimSubmission::new(ctx.config.airdrop_contract, &prepared.compiled)?;

    let tx_hash = timed(
        Step::Submission,
        ctx.config.confirmation_timeout(),
        submitter.submit(&submission),
    )
    .await?;
    tracing::info!("Query submitted in {tx_hash}");

    Ok(ClaimOutcome { prepared, tx_hash })
}

#[cfg(test)]
mod tests {
    use alloy::{primitives::B256, sol_types::SolCall};

    use super::*;
    use crate::{
        error::ValidationError,
        submit::{v2, v2_beta},
        testing::{MockChain, MockLocator, MockSubmitter, AIRDROP, CLAIMER, SWAP_TX},
    };

    fn context(version: ProtocolVersion) -> FlowContext {
        let config = toml::from_str::<Config>(&format!(
            r#"
            AIRDROP_CONTRACT = "{AIRDROP}"
            PROTOCOL_VERSION = "{version}"
            INJECT_RANDOM_HEADER = false
            "#
        ))
        .unwrap();
        FlowContext { claimer: CLAIMER, chain_id: 5, config }
    }

    fn event() -> SwapEvent {
        SwapEvent { tx_hash: SWAP_TX, block_height: 100, log_idx: 3 }
    }

    #[tokio::test]
    async fn no_event_fails_before_any_chain_call() {
        let ctx = context(ProtocolVersion::V2);
        let chain = MockChain::with_swap();
        let submitter = MockSubmitter::default();

        let err = run_claim(&ctx, &MockLocator { event: None }, &chain, &submitter)
            .await
            .err()
            .unwrap();

        assert!(matches!(
            err,
            FlowError::Input(InputError::NoMatchingEvent(addr)) if addr == CLAIMER
        ));
        assert_eq!(chain.calls(), 0);
        assert!(submitter.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn incomplete_event_fails_before_any_chain_call() {
        let ctx = context(ProtocolVersion::V2);
        let chain = MockChain::with_swap();
        let mut locator = MockLocator::swap(3);
        locator.event.as_mut().unwrap().tx_hash = None;

        let err = prepare_claim(&ctx, &locator, &chain).await.err().unwrap();
        assert!(matches!(err, FlowError::Input(InputError::MissingEventField("tx_hash"))));
        assert_eq!(chain.calls(), 0);
    }

    #[tokio::test]
    async fn claim_attaches_the_computed_fee() {
        let ctx = context(ProtocolVersion::V2);
        let chain = MockChain::with_swap();
        let submitter = MockSubmitter::default();

        let outcome = run_claim(&ctx, &MockLocator::swap(3), &chain, &submitter).await.unwrap();

        let sent = submitter.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, AIRDROP);
        assert_eq!(sent[0].value, outcome.prepared.fee);
        assert_eq!(outcome.prepared.fee, outcome.prepared.compiled.calculate_fee().unwrap());
        assert_eq!(outcome.tx_hash, TxHash::repeat_byte(0xee));

        let call = v2::claimAirdropCall::abi_decode(&sent[0].input, true).unwrap();
        assert_eq!(call.axiomData.refundee, CLAIMER);
        assert_eq!(call.axiomData.callback.extraData, CLAIMER.into_word());
        assert_eq!(call.axiomData.dataQueryHash, outcome.prepared.compiled.data_query_hash);
    }

    #[tokio::test]
    async fn beta_claim_uses_callback_selector() {
        let ctx = context(ProtocolVersion::V2Beta);
        let chain = MockChain::with_swap();
        let submitter = MockSubmitter::default();

        run_claim(&ctx, &MockLocator::swap(3), &chain, &submitter).await.unwrap();

        let sent = submitter.sent.lock().unwrap();
        let call = v2_beta::claimAirdropCall::abi_decode(&sent[0].input, true).unwrap();
        assert_eq!(call.axiomData.callback.callbackAddr, AIRDROP);
        assert_eq!(call.axiomData.callback.callbackFunctionSelector, callback_selector());
    }

    #[tokio::test]
    async fn same_event_yields_same_query_hash() {
        let ctx = context(ProtocolVersion::V2);
        let chain = MockChain::with_swap();

        let first = prepare_claim(&ctx, &MockLocator::swap(3), &chain).await.unwrap();
        let second = prepare_claim(&ctx, &MockLocator::swap(3), &chain).await.unwrap();

        assert_eq!(first.compiled.data_query_hash, second.compiled.data_query_hash);
        assert_eq!(first.compiled.query_hash, second.compiled.query_hash);
        assert_eq!(first.compiled.callback_hash, second.compiled.callback_hash);
    }

    #[tokio::test]
    async fn salt_header_changes_the_query_hash() {
        let ctx = context(ProtocolVersion::V2);
        let chain = MockChain::with_swap();

        let plain = assemble_claim_query(&ctx, &event(), None).unwrap();
        let salted = assemble_claim_query(&ctx, &event(), Some(42)).unwrap();
        assert_eq!(salted.declarations().len(), plain.declarations().len() + 1);

        let plain = plain.build(&chain).await.unwrap();
        let salted = salted.build(&chain).await.unwrap();
        assert_ne!(plain.query_hash, salted.query_hash);
        assert_eq!(salted.data_query.len(), plain.data_query.len() + 10);
    }

    #[tokio::test]
    async fn random_header_adds_a_subquery() {
        let mut ctx = context(ProtocolVersion::V2);
        ctx.config.inject_random_header = true;
        let chain = MockChain::with_swap();

        let prepared = prepare_claim(&ctx, &MockLocator::swap(3), &chain).await.unwrap();
        assert_eq!(prepared.compiled.compute_query.result_len, 5);
    }

    #[tokio::test]
    async fn failed_validation_is_advisory() {
        let ctx = context(ProtocolVersion::V2);
        let chain = MockChain::with_swap();
        let submitter = MockSubmitter::default();

        // log 9 is past the end of the receipt
        run_claim(&ctx, &MockLocator::swap(9), &chain, &submitter).await.unwrap();
        assert_eq!(submitter.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn strict_validation_blocks_submission() {
        let mut ctx = context(ProtocolVersion::V2);
        ctx.config.strict_validation = true;
        let chain = MockChain::with_swap();
        let submitter = MockSubmitter::default();

        let err = run_claim(&ctx, &MockLocator::swap(9), &chain, &submitter).await.err().unwrap();
        assert!(matches!(err, FlowError::Validation(ValidationError::LogOutOfRange { .. })));
        assert!(submitter.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn claim_callback_encodes_claimer() {
        let callback = claim_callback(AIRDROP, CLAIMER, ProtocolVersion::V2);
        assert_eq!(&callback.extra_data[12..], CLAIMER.as_slice());
        assert_eq!(&callback.extra_data[..12], &B256::ZERO[..12]);
        assert_eq!(callback.function_selector, None);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_submission_times_out() {
        struct Hung;
        impl ClaimSubmitter for Hung {
            async fn submit(
                &self,
                _submission: &ClaimSubmission,
            ) -> Result<TxHash, crate::error::SubmissionError> {
                std::future::pending().await
            }
        }

        let ctx = context(ProtocolVersion::V2);
        let chain = MockChain::with_swap();

        let err = run_claim(&ctx, &MockLocator::swap(3), &chain, &Hung).await.err().unwrap();
        assert!(matches!(err, FlowError::Timeout { step: Step::Submission, .. }));
    }

    struct HungLocator;

    impl EventLocator for HungLocator {
        async fn find_latest_swap(
            &self,
            _recipient: Address,
        ) -> eyre::Result<Option<crate::locator::RawSwapEvent>> {
            std::future::pending().await
        }
    }

    /// Answers everything but never finds a transaction.
    struct HungLookupChain(MockChain);

    impl ChainReader for HungLookupChain {
        async fn chain_id(&self) -> eyre::Result<u64> {
            self.0.chain_id().await
        }

        async fn latest_block_number(&self) -> eyre::Result<u64> {
            self.0.latest_block_number().await
        }

        async fn code_at(&self, address: Address) -> eyre::Result<alloy::primitives::Bytes> {
            self.0.code_at(address).await
        }

        async fn locate_transaction(
            &self,
            _tx_hash: TxHash,
        ) -> eyre::Result<Option<crate::chain::TxLocation>> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hung_lookup_times_out() {
        let ctx = context(ProtocolVersion::V2);
        let chain = MockChain::with_swap();

        let err = prepare_claim(&ctx, &HungLocator, &chain).await.err().unwrap();
        assert!(matches!(err, FlowError::Timeout { step: Step::Lookup, .. }));
        assert_eq!(chain.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_build_times_out_after_advisory_validation() {
        let ctx = context(ProtocolVersion::V2);
        let chain = HungLookupChain(MockChain::with_swap());

        let err = prepare_claim(&ctx, &MockLocator::swap(3), &chain).await.err().unwrap();
        assert!(matches!(err, FlowError::Timeout { step: Step::Build, .. }));
    }

    #[tokio::test]
    async fn cancel_wins_over_pending_work() {
        let ctx = context(ProtocolVersion::V2);
        let chain = MockChain::with_swap();
        let submitter = MockSubmitter::default();

        let claim = run_claim(&ctx, &HungLocator, &chain, &submitter);
        let err = cancellable(claim, async {}).await.err().unwrap();

        assert!(matches!(err, FlowError::Cancelled));
        assert!(submitter.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn finished_work_is_returned_when_not_cancelled() {
        let ctx = context(ProtocolVersion::V2);
        let chain = MockChain::with_swap();

        let prepared = cancellable(
            prepare_claim(&ctx, &MockLocator::swap(3), &chain),
            std::future::pending::<()>(),
        )
        .await
        .unwrap();
        assert_eq!(prepared.event.log_idx, 3);
    }
}
