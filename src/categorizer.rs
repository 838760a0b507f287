use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::chart::ChartOfAccounts;
use crate::classifier::TextClassifier;
use crate::llm::{build_prompt, parse_answer, CompletionClient, RetryPolicy};
use crate::memory::{MemoryOrigin, MemoryScope, VendorMemory};
use crate::models::{ClassificationSource, SourceType};
use crate::rules::RuleStore;

pub struct ClassifyRequest<'a> {
    pub tenant: &'a str,
    pub memo: &'a str,
    pub vendor_key: &'a str,
    pub amount: Decimal,
    pub source: &'a str,
    pub source_type: SourceType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub account: String,
    pub source: ClassificationSource,
}

struct Generative {
    client: Arc<dyn CompletionClient>,
    retry: RetryPolicy,
    timeout: Duration,
}

/// Tiered account resolution: rules, tenant memory, global memory,
/// statistical model, generative model, default. Collaborators that are
/// not configured are skipped.
pub struct ClassificationResolver {
    chart: Arc<ChartOfAccounts>,
    rules: Option<Arc<dyn RuleStore>>,
    memory: Option<Arc<VendorMemory>>,
    classifier: Option<Arc<dyn TextClassifier>>,
    generative: Option<Generative>,
}

impl ClassificationResolver {
    pub fn new(chart: Arc<ChartOfAccounts>) -> Self {
        Self {
            chart,
            rules: None,
            memory: None,
            classifier: None,
            generative: None,
        }
    }

    pub fn with_rules(mut self, rules: Arc<dyn RuleStore>) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn with_memory(mut self, memory: Arc<VendorMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn TextClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_generative(mut self, client: Arc<dyn CompletionClient>, retry: RetryPolicy, timeout: Duration) -> Self {
        self.generative = Some(Generative { client, retry, timeout });
        self
    }

    fn acceptable(&self, account: &str, source: &str) -> bool {
        account != source && self.chart.contains(account)
    }

    /// Always returns a chart entry that differs from `req.source`.
    pub fn classify(&self, req: &ClassifyRequest<'_>) -> Classification {
        let result = self
            .from_rules(req)
            .or_else(|| self.from_memory(req, MemoryScope::Tenant))
            .or_else(|| self.from_memory(req, MemoryScope::Global))
            .or_else(|| self.from_classifier(req))
            .or_else(|| self.from_generative(req))
            .unwrap_or_else(|| Classification {
                account: self.chart.fallback_for(req.source).to_string(),
                source: ClassificationSource::Default,
            });
        debug!(
            key = req.vendor_key,
            account = %result.account,
            tier = result.source.as_str(),
            "classified"
        );
        result
    }

    fn from_rules(&self, req: &ClassifyRequest<'_>) -> Option<Classification> {
        let rules = self.rules.as_ref()?;
        if req.vendor_key.is_empty() {
            return None;
        }
        let rule = match rules.find_rule(req.tenant, req.vendor_key) {
            Ok(rule) => rule?,
            Err(e) => {
                warn!(error = %e, "rule lookup failed");
                return None;
            }
        };
        if !self.acceptable(&rule.account, req.source) {
            return None;
        }
        if let Err(e) = rules.record_rule_hit(rule.id) {
            warn!(error = %e, "failed to record rule hit");
        }
        Some(Classification {
            account: rule.account,
            source: ClassificationSource::Rule,
        })
    }

    fn from_memory(&self, req: &ClassifyRequest<'_>, scope: MemoryScope) -> Option<Classification> {
        let memory = self.memory.as_ref()?;
        if req.vendor_key.is_empty() {
            return None;
        }
        let entry = memory.lookup(scope, req.tenant, req.vendor_key)?;
        self.acceptable(&entry.account, req.source).then(|| Classification {
            account: entry.account,
            source: ClassificationSource::Memory,
        })
    }

    fn from_classifier(&self, req: &ClassifyRequest<'_>) -> Option<Classification> {
        let prediction = self.classifier.as_ref()?.predict(req.memo)?;
        self.acceptable(&prediction.account, req.source).then(|| Classification {
            account: prediction.account,
            source: ClassificationSource::Ml,
        })
    }

    fn from_generative(&self, req: &ClassifyRequest<'_>) -> Option<Classification> {
        let generative = self.generative.as_ref()?;
        let prompt = build_prompt(
            &self.chart,
            req.memo,
            &req.amount.to_string(),
            req.source,
            req.source_type,
        );
        let answer = match generative
            .retry
            .run(|| generative.client.complete(&prompt, 0.0, generative.timeout))
        {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "generative classification failed");
                return None;
            }
        };
        let Some(account) = parse_answer(&self.chart, &answer, req.source) else {
            debug!(answer = %answer, "discarding invalid model answer");
            return None;
        };
        let account = account.to_string();

        if let (Some(memory), false) = (&self.memory, req.vendor_key.is_empty()) {
            if let Err(e) = memory.remember(
                MemoryScope::Tenant,
                req.tenant,
                req.vendor_key,
                &account,
                1.0,
                MemoryOrigin::Ai,
            ) {
                warn!(error = %e, "failed to remember model answer");
            }
        }
        Some(Classification {
            account,
            source: ClassificationSource::Ai,
        })
    }
}
