//! Financial agent: currency conversion, savings plans, investment advice and
//! budget analysis.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use rand::Rng;
use serde_json::{json, Value};

use super::{
    unsupported, AgentError, AgentResult, AgentType, Capability, Credential, CredentialSet,
    DomainAgent, ParamSpec, ParamType, Provenance, SharedKeys,
};
use crate::cascade::{round2, seeded_rng, Cascade, DataSource, Retrieved};
use crate::providers::financial::{AlphaVantage, ExchangeRateApi, Fixer, MarketQuote, RatePair};
use crate::task::{
    BudgetRequest, CurrencyConversion, InvestmentRequest, RiskTolerance, SavingsPlanRequest, Task,
    TaskParams,
};

/// Conversion fee applied to every quote, in percent.
pub const CONVERSION_FEE_PERCENT: f64 = 2.0;

/// Built-in units per USD, used when no rate provider answers.
const MOCK_RATES_PER_USD: [(&str, f64); 12] = [
    ("USD", 1.0),
    ("EUR", 0.85),
    ("GBP", 0.73),
    ("JPY", 110.0),
    ("CAD", 1.25),
    ("AUD", 1.35),
    ("CHF", 0.92),
    ("CNY", 6.45),
    ("INR", 74.5),
    ("MXN", 20.0),
    ("BRL", 5.2),
    ("SGD", 1.35),
];

/// Expense categories counted as needs in the 50/30/20 split.
const NEEDS: [&str; 10] = [
    "housing",
    "rent",
    "mortgage",
    "utilities",
    "groceries",
    "transportation",
    "insurance",
    "healthcare",
    "debt",
    "childcare",
];

/// Maximum symbols quoted per investment request.
const MAX_QUOTES: usize = 5;

pub struct FinancialAgent {
    credentials: CredentialSet,
    rates: Cascade<RatePair, f64>,
    quotes: Cascade<String, MarketQuote>,
}

impl FinancialAgent {
    pub fn new(http: reqwest::Client, shared: SharedKeys) -> Self {
        Self {
            credentials: CredentialSet::new(shared),
            rates: Cascade::new("currency")
                .tier(Arc::new(ExchangeRateApi::new(http.clone())))
                .tier(Arc::new(Fixer::new(http.clone()))),
            quotes: Cascade::new("market_quote").tier(Arc::new(AlphaVantage::new(http))),
        }
    }

    async fn convert_currency(&self, request: &CurrencyConversion, trail: &mut Provenance) -> Value {
        let pair = RatePair::new(&request.from_currency, &request.to_currency);
        let retrieved = if pair.from == pair.to {
            Retrieved {
                value: 1.0,
                source: DataSource::Live("identity".to_string()),
                attempted: Vec::new(),
            }
        } else {
            self.rates.run(&pair, &self.credentials, mock_rate).await
        };
        trail.note(&retrieved);

        let rate = retrieved.value;
        let converted = round2(request.amount * rate);
        let fee = round2(converted * CONVERSION_FEE_PERCENT / 100.0);
        let final_amount = round2(request.amount * rate * (1.0 - CONVERSION_FEE_PERCENT / 100.0));

        json!({
            "amount": request.amount,
            "fromCurrency": request.from_currency,
            "toCurrency": request.to_currency,
            "rate": rate,
            "convertedAmount": converted,
            "fee": {
                "percentage": CONVERSION_FEE_PERCENT,
                "amount": fee,
            },
            "finalAmount": final_amount,
            "rateType": if retrieved.is_fallback() { "fallback" } else { "live" },
            "provider": retrieved.source.label(),
            "timestamp": Utc::now(),
        })
    }

    async fn investment_advice(&self, request: &InvestmentRequest, trail: &mut Provenance) -> Value {
        let (mut stocks, mut bonds, mut cash) = match request.risk_tolerance {
            RiskTolerance::Low => (30.0, 50.0, 20.0),
            RiskTolerance::Medium => (60.0, 30.0, 10.0),
            RiskTolerance::High => (80.0, 15.0, 5.0),
        };
        // Short horizons move part of the equity share into cash.
        if request.time_horizon_years < 3 {
            let shift = f64::min(10.0, stocks);
            stocks -= shift;
            cash += shift;
        } else if request.time_horizon_years >= 15 && request.risk_tolerance != RiskTolerance::Low {
            let shift = f64::min(5.0, bonds);
            bonds -= shift;
            stocks += shift;
        }

        let expected_return = (stocks * 7.0 + bonds * 3.0 + cash * 1.5) / 100.0;
        let projected =
            request.amount * (1.0 + expected_return / 100.0).powi(request.time_horizon_years as i32);

        let mut quotes = Vec::new();
        for symbol in request.symbols.iter().take(MAX_QUOTES) {
            let retrieved = self
                .quotes
                .run(symbol, &self.credentials, |s: &String| mock_quote(s))
                .await;
            trail.note(&retrieved);
            quotes.push(retrieved.value);
        }

        json!({
            "amount": request.amount,
            "riskTolerance": request.risk_tolerance,
            "timeHorizonYears": request.time_horizon_years,
            "allocation": [
                {"assetClass": "stocks", "percentage": stocks, "amount": round2(request.amount * stocks / 100.0)},
                {"assetClass": "bonds", "percentage": bonds, "amount": round2(request.amount * bonds / 100.0)},
                {"assetClass": "cash", "percentage": cash, "amount": round2(request.amount * cash / 100.0)},
            ],
            "expectedAnnualReturnPercent": round2(expected_return),
            "projectedValue": round2(projected),
            "marketQuotes": quotes,
            "dataSource": trail.data_source(),
            "disclaimer": "Educational estimate only, not financial advice.",
        })
    }
}

#[async_trait]
impl DomainAgent for FinancialAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Financial
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![
            Capability::new("convertCurrency", "Convert an amount between currencies, net of fees")
                .param("amount", ParamSpec::required(ParamType::Number))
                .param("fromCurrency", ParamSpec::required(ParamType::String))
                .param("toCurrency", ParamSpec::required(ParamType::String)),
            Capability::new("createSavingsPlan", "Monthly savings schedule toward a target")
                .param("targetAmount", ParamSpec::required(ParamType::Number))
                .param("currentSavings", ParamSpec::with_default(ParamType::Number, json!(0)))
                .param("targetDate", ParamSpec::optional(ParamType::String))
                .param("months", ParamSpec::optional(ParamType::Integer))
                .param("monthlyIncome", ParamSpec::optional(ParamType::Number))
                .param("interestRate", ParamSpec::with_default(ParamType::Number, json!(0))),
            Capability::new("getInvestmentAdvice", "Asset allocation for a risk profile")
                .param("amount", ParamSpec::required(ParamType::Number))
                .param("riskTolerance", ParamSpec::with_default(ParamType::String, json!("medium")))
                .param("timeHorizonYears", ParamSpec::with_default(ParamType::Integer, json!(5)))
                .param("symbols", ParamSpec::optional(ParamType::Array)),
            Capability::new("analyzeBudget", "Spending breakdown against the 50/30/20 rule")
                .param("monthlyIncome", ParamSpec::required(ParamType::Number))
                .param("expenses", ParamSpec::required(ParamType::Object))
                .param("savingsGoal", ParamSpec::optional(ParamType::Number)),
        ]
    }

    async fn execute_task(&self, task: &Task) -> Result<AgentResult, AgentError> {
        let params = TaskParams::parse(&task.task_type, &task.parameters)?;
        let mut trail = Provenance::default();

        let (data, confidence) = match params {
            TaskParams::ConvertCurrency(r) => (self.convert_currency(&r, &mut trail).await, 0.95),
            TaskParams::SavingsPlan(r) => (savings_plan(&r), 0.9),
            TaskParams::InvestmentAdvice(r) => (self.investment_advice(&r, &mut trail).await, 0.75),
            TaskParams::AnalyzeBudget(r) => (analyze_budget(&r), 0.85),
            _ => return Err(unsupported(AgentType::Financial, task)),
        };

        Ok(trail.finish(AgentType::Financial, &task.task_type, data, confidence))
    }

    fn set_api_credentials(&mut self, provider: &str, credential: Credential) {
        self.credentials.insert(provider, credential);
    }

    fn api_credentials(&self, provider: &str) -> Option<&Credential> {
        self.credentials.get(provider)
    }
}

/// Cross rate from the built-in table. Unknown codes count as USD parity.
fn mock_rate(pair: &RatePair) -> f64 {
    let per_usd = |code: &str| {
        MOCK_RATES_PER_USD
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, r)| *r)
            .unwrap_or(1.0)
    };
    per_usd(&pair.to) / per_usd(&pair.from)
}

fn mock_quote(symbol: &str) -> MarketQuote {
    let mut rng = seeded_rng(symbol);
    MarketQuote {
        symbol: symbol.to_string(),
        price: round2(rng.gen_range(20.0..400.0)),
        change_percent: round2(rng.gen_range(-2.5..2.5)),
    }
}

fn months_until(target: chrono::NaiveDate) -> u32 {
    let today = Utc::now().date_naive();
    let months = (target.year() - today.year()) * 12 + target.month() as i32 - today.month() as i32;
    months.max(1) as u32
}

fn savings_plan(request: &SavingsPlanRequest) -> Value {
    let months = request
        .months
        .filter(|m| *m > 0)
        .or_else(|| request.target_date.map(months_until))
        .unwrap_or(1);
    let n = months as f64;
    let monthly_rate = request.interest_rate / 100.0 / 12.0;

    let grown_savings = request.current_savings * (1.0 + monthly_rate).powf(n);
    let remaining = (request.target_amount - grown_savings).max(0.0);
    let monthly = if monthly_rate > 0.0 {
        remaining * monthly_rate / ((1.0 + monthly_rate).powf(n) - 1.0)
    } else {
        remaining / n
    };
    let monthly = round2(monthly);

    let income_share = request
        .monthly_income
        .filter(|i| *i > 0.0)
        .map(|income| monthly / income);
    let feasibility = match income_share {
        None => "unknown",
        Some(s) if s <= 0.2 => "achievable",
        Some(s) if s <= 0.4 => "challenging",
        Some(_) => "unrealistic",
    };

    let milestones: Vec<Value> = [25.0, 50.0, 75.0, 100.0]
        .iter()
        .map(|pct| {
            let month = ((n * pct / 100.0).ceil() as u32).max(1);
            json!({
                "percent": pct,
                "amount": round2(request.target_amount * pct / 100.0),
                "month": month,
            })
        })
        .collect();

    json!({
        "targetAmount": request.target_amount,
        "currentSavings": request.current_savings,
        "months": months,
        "monthlyContribution": monthly,
        "annualInterestRate": request.interest_rate,
        "incomeShare": income_share.map(|s| round2(s * 100.0)),
        "feasibility": feasibility,
        "milestones": milestones,
    })
}

fn analyze_budget(request: &BudgetRequest) -> Value {
    let income = request.monthly_income;
    let total: f64 = request.expenses.values().sum();
    let needs: f64 = request
        .expenses
        .iter()
        .filter(|(name, _)| NEEDS.contains(&name.to_ascii_lowercase().as_str()))
        .map(|(_, v)| v)
        .sum();
    let wants = total - needs;
    let remaining = income - total;
    let savings_rate = remaining.max(0.0) / income;

    let mut recommendations = Vec::new();
    if needs / income > 0.5 {
        recommendations.push(format!(
            "Essential costs take {:.0}% of income; the 50/30/20 guideline suggests 50%.",
            needs / income * 100.0
        ));
    }
    if wants / income > 0.3 {
        recommendations.push(format!(
            "Discretionary spending is {:.0}% of income; aim for 30% or less.",
            wants / income * 100.0
        ));
    }
    if savings_rate < 0.2 {
        recommendations.push("Try to set aside at least 20% of income each month.".to_string());
    }
    if let Some(goal) = request.savings_goal {
        if remaining < goal {
            recommendations.push(format!(
                "Monthly surplus of {:.2} is short of the {:.2} savings goal.",
                remaining, goal
            ));
        }
    }
    if let Some((name, amount)) = request
        .expenses
        .iter()
        .max_by(|a, b| a.1.total_cmp(b.1))
    {
        recommendations.push(format!("Largest expense is {} at {:.2}.", name, amount));
    }

    let breakdown: Vec<Value> = request
        .expenses
        .iter()
        .map(|(name, amount)| {
            json!({
                "category": name,
                "amount": amount,
                "percentOfIncome": round2(amount / income * 100.0),
            })
        })
        .collect();

    json!({
        "monthlyIncome": income,
        "totalExpenses": round2(total),
        "remaining": round2(remaining),
        "savingsRatePercent": round2(savings_rate * 100.0),
        "rule503020": {
            "needs": {"actual": round2(needs), "target": round2(income * 0.5)},
            "wants": {"actual": round2(wants), "target": round2(income * 0.3)},
            "savings": {"actual": round2(remaining.max(0.0)), "target": round2(income * 0.2)},
        },
        "breakdown": breakdown,
        "recommendations": recommendations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::testing::FakeProvider;
    use serde_json::json;

    fn agent() -> FinancialAgent {
        FinancialAgent::new(reqwest::Client::new(), SharedKeys::default())
    }

    fn convert_task(amount: f64, from: &str, to: &str) -> Task {
        Task::new(
            "goal-1",
            "user-1",
            "convertCurrency",
            json!({"amount": amount, "fromCurrency": from, "toCurrency": to}),
        )
    }

    #[tokio::test]
    async fn test_convert_currency_fallback_rate() {
        let result = agent().execute_task(&convert_task(1000.0, "USD", "EUR")).await.unwrap();

        assert!(result.success);
        assert!(result.is_fallback());
        assert_eq!(result.confidence, 0.95);
        assert_eq!(result.data["rateType"], "fallback");
        assert_eq!(result.data["rate"], 0.85);
        assert_eq!(result.data["fee"]["percentage"], 2.0);
        assert_eq!(result.data["finalAmount"], round2(1000.0 * 0.85 * 0.98));
        assert_eq!(result.data["finalAmount"], 833.0);
    }

    #[tokio::test]
    async fn test_live_rate_short_circuits() {
        let primary = FakeProvider::ok("exchangerate_api", 0.9);
        let secondary = FakeProvider::ok("fixer", 0.5);

        let mut agent = agent();
        agent.rates = Cascade::new("currency")
            .tier(primary.clone())
            .tier(secondary.clone());
        agent.set_api_credentials("exchangerate_api", Credential::new("exchangerate_api", "key", "k"));
        agent.set_api_credentials("fixer", Credential::new("fixer", "access_key", "k"));

        let result = agent.execute_task(&convert_task(100.0, "USD", "EUR")).await.unwrap();

        assert_eq!(result.data["rateType"], "live");
        assert_eq!(result.data["finalAmount"], 88.2);
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_primary_falls_to_secondary() {
        let primary = FakeProvider::<f64>::failing("exchangerate_api", 503);
        let secondary = FakeProvider::ok("fixer", 0.5);

        let mut agent = agent();
        agent.rates = Cascade::new("currency")
            .tier(primary.clone())
            .tier(secondary.clone());
        agent.set_api_credentials("exchangerate_api", Credential::new("exchangerate_api", "key", "k"));
        agent.set_api_credentials("fixer", Credential::new("fixer", "access_key", "k"));

        let result = agent.execute_task(&convert_task(10.0, "USD", "GBP")).await.unwrap();
        assert_eq!(result.data["provider"], "fixer");
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 1);
    }

    #[test]
    fn test_mock_cross_rate() {
        let rate = mock_rate(&RatePair::new("EUR", "GBP"));
        assert!((rate - 0.73 / 0.85).abs() < 1e-12);
        assert_eq!(mock_rate(&RatePair::new("USD", "XYZ")), 1.0);
    }

    #[test]
    fn test_savings_plan_without_interest() {
        let plan = savings_plan(&SavingsPlanRequest {
            target_amount: 12_000.0,
            current_savings: 2_000.0,
            target_date: None,
            months: Some(10),
            monthly_income: Some(4_000.0),
            interest_rate: 0.0,
        });

        assert_eq!(plan["monthlyContribution"], 1000.0);
        assert_eq!(plan["incomeShare"], 25.0);
        assert_eq!(plan["feasibility"], "challenging");
        assert_eq!(plan["milestones"].as_array().unwrap().len(), 4);
        assert_eq!(plan["milestones"][3]["month"], 10);
    }

    #[test]
    fn test_savings_plan_interest_lowers_contribution() {
        let base = SavingsPlanRequest {
            target_amount: 10_000.0,
            current_savings: 0.0,
            target_date: None,
            months: Some(24),
            monthly_income: None,
            interest_rate: 0.0,
        };
        let plain = savings_plan(&base)["monthlyContribution"].as_f64().unwrap();
        let with_interest = savings_plan(&SavingsPlanRequest {
            interest_rate: 5.0,
            ..base
        })["monthlyContribution"]
            .as_f64()
            .unwrap();
        assert!(with_interest < plain);
    }

    #[tokio::test]
    async fn test_investment_quotes_fall_back() {
        let result = agent()
            .execute_task(&Task::new(
                "g",
                "u",
                "getInvestmentAdvice",
                json!({"amount": 10000, "riskTolerance": "high", "symbols": ["aapl", "msft"]}),
            ))
            .await
            .unwrap();

        assert_eq!(result.confidence, 0.75);
        assert!(result.is_fallback());
        let allocation = result.data["allocation"].as_array().unwrap();
        let total: f64 = allocation.iter().map(|a| a["percentage"].as_f64().unwrap()).sum();
        assert_eq!(total, 100.0);
        assert_eq!(result.data["marketQuotes"][0]["symbol"], "AAPL");
    }

    #[test]
    fn test_budget_analysis() {
        let mut expenses = std::collections::BTreeMap::new();
        expenses.insert("rent".to_string(), 1500.0);
        expenses.insert("groceries".to_string(), 400.0);
        expenses.insert("dining".to_string(), 600.0);

        let report = analyze_budget(&BudgetRequest {
            monthly_income: 3000.0,
            expenses,
            savings_goal: Some(1000.0),
        });

        assert_eq!(report["totalExpenses"], 2500.0);
        assert_eq!(report["remaining"], 500.0);
        assert_eq!(report["rule503020"]["needs"]["actual"], 1900.0);
        let recs = report["recommendations"].as_array().unwrap();
        assert!(recs.iter().any(|r| r.as_str().unwrap().contains("rent")));
    }
}
