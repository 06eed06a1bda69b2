//! Deterministic keyword router (§4.1, algorithm 1).
//!
//! Sub-10ms target, pure function, cannot fail. Applies domain precedence,
//! then code precedence, then research precedence, defaulting to Chat.
//! Confidence is additive from a base of 0.5 and capped at 1.0.
//!
//! Pattern style (named `LazyLock<Regex>` statics, additive signal scoring)
//! follows the teacher's former pattern-classifier module, retargeted from
//! RLM activation signals to [`crate::types::TaskKind`] classification.

use regex::Regex;
use std::sync::LazyLock;

use crate::types::{RoutingDecision, RoutingMethod, TaskKind, ToolRecommendation};

static WEATHER_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(weather|temperature|humidity|forecast|rain|snow|wind\s*speed|天氣|氣溫|濕度|降雨|預報)")
        .unwrap()
});

static FINANCE_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(stock|share\s*price|ticker|market\s*cap|exchange\s*rate|股價|股票|匯率|行情)")
        .unwrap()
});

static ROUTING_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(directions?|route|how\s+(far|long)\s+(to|from)|drive\s+to|交通|路線|怎麼去|導航)")
        .unwrap()
});

static RAG_DOC_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(according\s+to\s+the\s+document|in\s+the\s+(pdf|docs?|file)|cite|citation|根據文件|文件中)")
        .unwrap()
});

static CODE_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(write\s+(a\s+)?(program|script|function|code)|calculate|compute|algorithm|debug|程式|代碼|計算)")
        .unwrap()
});

static MATH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+\s*[\+\-\*/\^]\s*\d+|\bsin\(|\bcos\(|\btan\(|\bsqrt\(|\blog\(|π|\d+\.\d+|\d+\s*\*\*\s*\d+)")
        .unwrap()
});

static UNIT_CONVERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(\.\d+)?\s*[a-zA-Z°]+\s*(in|to|转|換算|換成)\s*[a-zA-Z°]+)").unwrap()
});

static CALCULATION_INDICATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(how\s+many|how\s+much|多少)").unwrap());

static RESEARCH_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(compare|latest|research|advances?\s+in|summarize|overview\s+of|what\s+is\s+the\s+state\s+of|研究|比較|最新)")
        .unwrap()
});

static QUESTION_MARK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[?？]\s*$").unwrap());

static REAL_TIME_WORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\bnow\b|\bcurrent(ly)?\b|現在|實時|实时)").unwrap());

const BASE_CONFIDENCE: f64 = 0.5;

/// Precedence order for domain lexicons; first match wins among domains.
fn domain_match(query: &str) -> Option<(TaskKind, &'static str)> {
    if WEATHER_WORDS.is_match(query) {
        return Some((TaskKind::DomainWeather, "weather"));
    }
    if FINANCE_WORDS.is_match(query) {
        return Some((TaskKind::DomainFinance, "finance"));
    }
    if ROUTING_WORDS.is_match(query) {
        return Some((TaskKind::DomainRouting, "routing"));
    }
    if RAG_DOC_WORDS.is_match(query) {
        return Some((TaskKind::Rag, "rag_document"));
    }
    None
}

/// Pure-function keyword classifier. Never fails; `method` is always
/// [`RoutingMethod::Keyword`].
#[derive(Debug, Clone, Default)]
pub struct KeywordRouter;

impl KeywordRouter {
    pub fn new() -> Self {
        Self
    }

    pub fn route(&self, query: &str) -> RoutingDecision {
        let real_time = REAL_TIME_WORDS.is_match(query);
        let mut confidence = BASE_CONFIDENCE;
        let mut reasons: Vec<String> = Vec::new();

        let primary_task = if let Some((kind, label)) = domain_match(query) {
            confidence += 0.25;
            reasons.push(format!("matched {label} lexicon"));
            if real_time {
                confidence += 0.1;
                reasons.push("real-time marker boosts domain confidence".to_string());
            }
            kind
        } else {
            let code_keyword = CODE_WORDS.is_match(query);
            let math_pattern = MATH_PATTERN.is_match(query);
            let unit_conversion = UNIT_CONVERSION_PATTERN.is_match(query);
            let calc_indicator = CALCULATION_INDICATOR.is_match(query);

            if code_keyword || math_pattern || unit_conversion {
                if code_keyword {
                    confidence += 0.25;
                    reasons.push("matched code keyword".to_string());
                }
                if math_pattern {
                    confidence += 0.15;
                    reasons.push("matched math pattern".to_string());
                }
                if unit_conversion {
                    confidence += 0.20;
                    reasons.push("matched unit-conversion pattern".to_string());
                }
                if calc_indicator {
                    confidence += 0.10;
                    reasons.push("matched calculation indicator".to_string());
                }

                if real_time {
                    // A numeric-sounding query asking about "now"/"current" is
                    // live data, not computation: force Research instead.
                    confidence -= 0.30;
                    reasons.push(
                        "real-time marker downgrades Code confidence, forcing Research"
                            .to_string(),
                    );
                    TaskKind::Research
                } else {
                    TaskKind::Code
                }
            } else if RESEARCH_WORDS.is_match(query) || QUESTION_MARK.is_match(query.trim_end()) {
                confidence += 0.25;
                reasons.push("matched research verb/noun or question terminator".to_string());
                TaskKind::Research
            } else {
                TaskKind::Chat
            }
        };

        confidence = confidence.clamp(0.0, 1.0);

        let tools_needed = match primary_task {
            TaskKind::Code => vec![ToolRecommendation::new("code_sandbox", confidence)],
            TaskKind::Research => vec![ToolRecommendation::new("search", confidence)],
            TaskKind::Rag => vec![ToolRecommendation::new("vector_store", confidence)],
            TaskKind::DomainWeather => vec![ToolRecommendation::new("weather_provider", confidence)],
            TaskKind::DomainFinance => vec![ToolRecommendation::new("finance_provider", confidence)],
            TaskKind::DomainRouting => vec![ToolRecommendation::new("routing_provider", confidence)],
            TaskKind::Chat | TaskKind::Workflow => Vec::new(),
        };

        let follow_up_questions = if confidence < 0.5 {
            vec!["Could you clarify what you're looking for?".to_string()]
        } else {
            Vec::new()
        };

        let reasoning = if reasons.is_empty() {
            "no keyword signal matched, defaulting to Chat".to_string()
        } else {
            reasons.join("; ")
        };

        RoutingDecision {
            query: query.to_string(),
            primary_task,
            confidence,
            reasoning,
            method: RoutingMethod::Keyword,
            tools_needed,
            multi_intent: false,
            follow_up_questions,
            estimated_duration_ms: estimate_duration(primary_task),
        }
    }
}

fn estimate_duration(kind: TaskKind) -> u64 {
    match kind {
        TaskKind::Chat => 1_500,
        TaskKind::Code => 15_000,
        TaskKind::Research => 20_000,
        TaskKind::Rag => 5_000,
        TaskKind::DomainWeather | TaskKind::DomainFinance | TaskKind::DomainRouting => 4_000,
        TaskKind::Workflow => 30_000,
    }
}
