//! Domain knowledge provider — static, read-only context per named domain.
//!
//! Ships a handful of built-in domains; configuration can add more or
//! override a built-in by reusing its id. Contexts are immutable once the
//! registry is built.

use contexta_config::DomainConfig;
use contexta_core::error::{Error, Result};
use contexta_core::fact::{FactInput, FactSource, FactType};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Static knowledge for one domain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainContext {
    pub domain_id: String,
    pub name: String,
    pub knowledge: String,
    pub keywords: Vec<String>,
    /// Recommended total token budget for assemblies in this domain
    pub token_budget: usize,
    /// Facts seeded into entities created for this domain
    pub seed_facts: Vec<FactInput>,
}

impl From<DomainConfig> for DomainContext {
    fn from(config: DomainConfig) -> Self {
        let name = if config.name.trim().is_empty() {
            config.id.clone()
        } else {
            config.name
        };
        Self {
            domain_id: config.id,
            name,
            knowledge: config.knowledge,
            keywords: config.keywords,
            token_budget: config.token_budget,
            seed_facts: config.seed_facts,
        }
    }
}

/// Keyword match score for one domain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainMatch {
    pub domain_id: String,
    /// `matched / keywords.len()`, in [0, 1]
    pub score: f32,
    pub matched: Vec<String>,
}

/// All known domains, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct DomainRegistry {
    domains: BTreeMap<String, Arc<DomainContext>>,
}

impl DomainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding only the built-in domains.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for domain in builtin_domains() {
            registry.insert(domain);
        }
        registry
    }

    /// Built-ins plus configured domains; configured entries win on id clash.
    pub fn from_config(configured: &[DomainConfig]) -> Self {
        let mut registry = Self::builtin();
        for config in configured {
            registry.insert(DomainContext::from(config.clone()));
        }
        registry
    }

    pub fn insert(&mut self, domain: DomainContext) {
        self.domains
            .insert(domain.domain_id.clone(), Arc::new(domain));
    }

    /// Resolve a domain. Unknown ids are a configuration error.
    pub fn lookup(&self, domain_id: &str) -> Result<Arc<DomainContext>> {
        self.domains
            .get(domain_id)
            .cloned()
            .ok_or_else(|| Error::Configuration(format!("unknown domain: {domain_id}")))
    }

    pub fn contains(&self, domain_id: &str) -> bool {
        self.domains.contains_key(domain_id)
    }

    /// All domains in id order.
    pub fn list(&self) -> Vec<Arc<DomainContext>> {
        self.domains.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Score every domain against free text and rank the matching ones, best first.
    ///
    /// Score is the fraction of a domain's keywords found in `text`
    /// (case-insensitive substring match). Domains with no matching keyword
    /// are omitted. Ties are broken by domain id.
    pub fn match_by_keywords(&self, text: &str) -> Vec<DomainMatch> {
        let haystack = text.to_lowercase();
        let mut matches: Vec<DomainMatch> = self
            .domains
            .values()
            .map(|domain| {
                let matched: Vec<String> = domain
                    .keywords
                    .iter()
                    .filter(|kw| {
                        let needle = kw.trim().to_lowercase();
                        !needle.is_empty() && haystack.contains(&needle)
                    })
                    .cloned()
                    .collect();
                let score = if domain.keywords.is_empty() {
                    0.0
                } else {
                    matched.len() as f32 / domain.keywords.len() as f32
                };
                DomainMatch {
                    domain_id: domain.domain_id.clone(),
                    score,
                    matched,
                }
            })
            .filter(|m| m.score > 0.0)
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.domain_id.cmp(&b.domain_id))
        });
        matches
    }

    /// The best-matching domain, if any keyword matched at all.
    pub fn route(&self, text: &str) -> Option<DomainMatch> {
        self.match_by_keywords(text).into_iter().next()
    }
}

fn seed(fact_type: FactType, content: &str, confidence: f32) -> FactInput {
    FactInput::new(fact_type, content, confidence).with_source(FactSource::DomainSeed)
}

fn builtin_domains() -> Vec<DomainContext> {
    vec![
        DomainContext {
            domain_id: "government_rnd".into(),
            name: "Government R&D programs".into(),
            knowledge: [
                "Government R&D (정부 R&D) proposals are scored on technical merit (기술성) and commercialization potential (사업성).",
                "Evaluators expect quantified development goals, a verifiable test plan and a realistic budget breakdown.",
                "Matching funds from the applicant are usually required; private contribution ratios depend on company size.",
                "Prior failures on technical merit are the most common reason for rejection in follow-up rounds.",
            ]
            .join("\n"),
            keywords: ["r&d", "연구개발", "기술개발", "과제", "research", "technology development"]
                .map(String::from)
                .to_vec(),
            token_budget: 2000,
            seed_facts: vec![seed(
                FactType::Constraint,
                "R&D proposals need quantified development goals and a test plan",
                0.8,
            )],
        },
        DomainContext {
            domain_id: "startup_support".into(),
            name: "Startup support programs".into(),
            knowledge: [
                "Startup support programs (창업지원사업) target founders by business age: pre-startup, early (under 3 years) and growth (3 to 7 years).",
                "Applications are judged on problem definition, solution fit, market size and team capability.",
                "A clear go-to-market plan with measurable milestones improves selection odds.",
            ]
            .join("\n"),
            keywords: ["창업", "startup", "예비창업", "초기창업", "tips", "founder"]
                .map(String::from)
                .to_vec(),
            token_budget: 1800,
            seed_facts: vec![seed(
                FactType::Constraint,
                "Eligibility depends on years since founding",
                0.8,
            )],
        },
        DomainContext {
            domain_id: "manufacturing".into(),
            name: "Manufacturing innovation".into(),
            knowledge: [
                "Smart factory (스마트공장) programs fund process digitization for SMEs with an on-site manufacturing line.",
                "Proposals must describe current process bottlenecks and expected productivity gains with baseline figures.",
                "Supplier quotes for equipment and software are checked against the requested budget.",
            ]
            .join("\n"),
            keywords: ["제조", "manufacturing", "스마트공장", "smart factory", "공정", "factory"]
                .map(String::from)
                .to_vec(),
            token_budget: 1600,
            seed_facts: Vec::new(),
        },
        DomainContext {
            domain_id: "export_voucher".into(),
            name: "Export support".into(),
            knowledge: [
                "Export vouchers (수출바우처) reimburse marketing, certification and logistics costs for overseas expansion.",
                "Selection weighs current export performance and the credibility of the target-market plan.",
            ]
            .join("\n"),
            keywords: ["수출", "export", "해외", "overseas", "바우처", "global"]
                .map(String::from)
                .to_vec(),
            token_budget: 1500,
            seed_facts: Vec::new(),
        },
    ]
}
