//! Trading Bot
//!
//! One decision cycle fetches candles, runs order-flow and regime analysis,
//! asks the decision provider for a recommendation, then adjusts and sizes
//! it. The live loop repeats cycles on a fixed interval until shutdown.
//!
//! No orders are sent; sized decisions are logged.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::config::BotConfig;
use crate::analysis::{
    HeuristicRegimeDetector, OrderFlowAnalyzer, RegimeDetector, SweepFlow,
};
use crate::decision::{adjust, PositionSizer, TradingDecision};
use crate::llm::{AdditionalContext, DecisionProvider};
use crate::market_data::MarketDataProvider;

/// Coordinates market data, analysis and the decision provider for one symbol
pub struct TradingBot {
    config: BotConfig,
    market_data: Arc<dyn MarketDataProvider>,
    provider: Arc<dyn DecisionProvider>,
    regime_detector: Arc<dyn RegimeDetector>,
    analyzer: OrderFlowAnalyzer,
    sizer: PositionSizer,
}

impl TradingBot {
    pub fn new(
        config: BotConfig,
        market_data: Arc<dyn MarketDataProvider>,
        provider: Arc<dyn DecisionProvider>,
    ) -> Self {
        let analyzer = OrderFlowAnalyzer::new(config.analysis.clone());
        let sizer = config.to_sizer();
        Self {
            config,
            market_data,
            provider,
            regime_detector: Arc::new(HeuristicRegimeDetector::default()),
            analyzer,
            sizer,
        }
    }

    pub fn with_regime_detector(mut self, detector: Arc<dyn RegimeDetector>) -> Self {
        self.regime_detector = detector;
        self
    }

    /// Run one decision cycle. Failures become a neutral decision.
    pub async fn get_trading_decision(&self, end: Option<DateTime<Utc>>) -> TradingDecision {
        let cycle = Uuid::new_v4();
        match self.decide(end, cycle).await {
            Ok(decision) => decision,
            Err(e) => {
                error!("[{}] {} cycle failed: {:#}", cycle, self.config.symbol, e);
                TradingDecision::neutral(format!("Error: {e:#}"))
            }
        }
    }

    async fn decide(&self, end: Option<DateTime<Utc>>, cycle: Uuid) -> Result<TradingDecision> {
        let symbol = &self.config.symbol;

        let frames = self
            .market_data
            .fetch_multi_timeframe(symbol, end)
            .await
            .with_context(|| format!("Failed to fetch market data for {}", symbol))?;

        if frames.min1.is_empty() {
            warn!("[{}] No market data available for {}", cycle, symbol);
            return Ok(TradingDecision::neutral("No market data available"));
        }
        let current_price = frames.current_price();

        let report = self.analyzer.analyze(&frames.min1);
        let flow = report.as_ref().map(|r| r.sweep).unwrap_or_else(SweepFlow::quiet);
        let regime = self.regime_detector.detect(&frames.hourly, &frames.min15);
        debug!(
            "[{}] regime={} conf={:.2} flow_bias={:?} aggressive={}",
            cycle, regime.regime, regime.confidence, flow.sweep_bias, flow.aggressive_flow
        );

        let context = AdditionalContext {
            market_regime: regime.clone(),
            order_flow: flow,
            footprint: report.map(|r| r.footprint),
        };

        let mut decision = match self.provider.get_trading_decision(&frames, &context).await {
            Ok(decision) => decision,
            Err(e) => {
                error!("[{}] Decision provider failed ({}): {}", cycle, e.kind(), e);
                TradingDecision::neutral(format!("Error getting trading decision: {e}"))
            }
        };
        decision.current_price = current_price;

        let raw_position = decision.position;
        let mut decision = adjust(decision, &flow, &regime);
        decision.size = self.sizer.size(&decision);

        info!(
            "[{}] {} decision: pos={:.2} (raw={:.2}), conf={:.2}, tp={:?}, sl={:?}, size={:.2}, regime={}, flow_bias={:?}",
            cycle,
            symbol,
            decision.position,
            raw_position,
            decision.confidence,
            decision.take_profit,
            decision.stop_loss,
            decision.size,
            regime.regime,
            flow.sweep_bias
        );

        Ok(decision)
    }

    /// Repeat decision cycles until `shutdown` turns true or its sender is dropped
    pub async fn run_live(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Starting live trading for {}", self.config.symbol);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let decision = self.get_trading_decision(None).await;
            info!(
                "{}: pos={:.2}, conf={:.2}, reason={}",
                self.config.symbol, decision.position, decision.confidence, decision.reasoning
            );

            if decision.size > 0.0 {
                info!(
                    "Would execute trade: {} {} with size {:.2}",
                    decision.side_label(),
                    self.config.symbol,
                    decision.size
                );
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.update_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Stopped live trading for {}", self.config.symbol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{MarketRegime, RegimeDetails, RegimeVerdict};
    use crate::llm::DecisionError;
    use crate::types::fixtures::*;
    use crate::types::{CandleSeries, MultiTimeframe, Timeframe};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct StaticData(Option<MultiTimeframe>);

    #[async_trait]
    impl MarketDataProvider for StaticData {
        async fn candles(
            &self,
            _symbol: &str,
            timeframe: Timeframe,
            _end: Option<DateTime<Utc>>,
        ) -> Result<CandleSeries> {
            match &self.0 {
                Some(frames) => Ok(frames.get(timeframe).clone()),
                None => anyhow::bail!("feed offline"),
            }
        }
    }

    struct StubProvider {
        response: Option<TradingDecision>,
        calls: AtomicUsize,
        last_context: Mutex<Option<AdditionalContext>>,
    }

    impl StubProvider {
        fn new(response: Option<TradingDecision>) -> Arc<Self> {
            Arc::new(Self {
                response,
                calls: AtomicUsize::new(0),
                last_context: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl DecisionProvider for StubProvider {
        async fn get_trading_decision(
            &self,
            _frames: &MultiTimeframe,
            context: &AdditionalContext,
        ) -> Result<TradingDecision, DecisionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_context.lock().unwrap() = Some(context.clone());
            self.response
                .clone()
                .ok_or_else(|| DecisionError::Validation("stub rejected".to_string()))
        }
    }

    struct FixedRegime(RegimeVerdict);

    impl RegimeDetector for FixedRegime {
        fn detect(&self, _higher: &CandleSeries, _lower: &CandleSeries) -> RegimeVerdict {
            self.0.clone()
        }
    }

    fn frames() -> MultiTimeframe {
        let s = series(quiet_series(40, 100.0));
        MultiTimeframe {
            hourly: s.clone(),
            min15: s.clone(),
            min5: s.clone(),
            min1: s,
        }
    }

    fn trending_up() -> Arc<FixedRegime> {
        Arc::new(FixedRegime(RegimeVerdict {
            regime: MarketRegime::TrendingUp,
            confidence: 0.8,
            details: RegimeDetails {
                trend_direction: 1,
                ..Default::default()
            },
        }))
    }

    fn long_decision() -> TradingDecision {
        TradingDecision {
            position: 0.8,
            confidence: 0.7,
            current_price: None,
            take_profit: Some(110.0),
            stop_loss: Some(95.0),
            reasoning: "Primary Levels: 95 support".to_string(),
            size: 0.0,
        }
    }

    fn bot(data: StaticData, provider: Arc<StubProvider>) -> TradingBot {
        TradingBot::new(BotConfig::default(), Arc::new(data), provider)
            .with_regime_detector(trending_up())
    }

    #[tokio::test]
    async fn test_full_cycle() {
        let provider = StubProvider::new(Some(long_decision()));
        let bot = bot(StaticData(Some(frames())), provider.clone());

        let d = bot.get_trading_decision(None).await;

        // Last quiet close (bar 39) is 100.15
        assert!((d.current_price.unwrap() - 100.15).abs() < 1e-9);
        assert!((d.confidence - 0.868).abs() < 1e-9);
        assert!((d.position - 0.8 * 0.8 * 0.868).abs() < 1e-9);
        assert_eq!(d.take_profit, Some(110.0));
        // rr = 9.85 / 5.15, factor ~0.6375, size 0.868 * 0.6375
        assert_eq!(d.size, 0.55);
        assert!(d.reasoning.starts_with("Market Regime: trending_up (conf: 0.80)\n"));

        let ctx = provider.last_context.lock().unwrap().clone().unwrap();
        assert_eq!(ctx.market_regime.regime, MarketRegime::TrendingUp);
        assert!(ctx.footprint.is_some());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_data_skips_provider() {
        let provider = StubProvider::new(Some(long_decision()));
        let empty = MultiTimeframe::default();
        let bot = bot(StaticData(Some(empty)), provider.clone());

        let d = bot.get_trading_decision(None).await;
        assert_eq!(d.reasoning, "No market data available");
        assert_eq!(d.size, 0.0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_feed_failure_is_neutral() {
        let provider = StubProvider::new(Some(long_decision()));
        let bot = bot(StaticData(None), provider);

        let d = bot.get_trading_decision(None).await;
        assert_eq!(d.position, 0.0);
        assert_eq!(d.size, 0.0);
        assert!(d.reasoning.starts_with("Error:"));
        assert!(d.reasoning.contains("feed offline"));
    }

    #[tokio::test]
    async fn test_provider_error_is_neutral() {
        let provider = StubProvider::new(None);
        let bot = bot(StaticData(Some(frames())), provider);

        let d = bot.get_trading_decision(None).await;
        assert_eq!(d.position, 0.0);
        assert_eq!(d.confidence, 0.0);
        assert_eq!(d.size, 0.0);
        assert!(d.current_price.is_some());
        assert!(d.reasoning.contains("stub rejected"));
    }

    #[tokio::test]
    async fn test_run_live_stops_on_shutdown() {
        let provider = StubProvider::new(Some(long_decision()));
        let config = BotConfig {
            update_interval: Duration::from_secs(3600),
            ..Default::default()
        };
        let bot = TradingBot::new(config, Arc::new(StaticData(Some(frames()))), provider.clone());

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { bot.run_live(rx).await });

        // Wait for the first cycle, then signal shutdown during the sleep
        for _ in 0..100 {
            if provider.calls.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("run_live did not stop")
            .unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}
