//! Package pricing, discounts and client proposals.
//!
//! Pure arithmetic over static tables; no I/O. Money is `BigDecimal` so
//! multipliers like 1.25 apply exactly.

use crate::errors::AppError;
use bigdecimal::BigDecimal;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::str::FromStr;
use uuid::Uuid;

// ============ Tables ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Package {
    Starter,
    Growth,
    Scale,
    Enterprise,
}

struct PackageSpec {
    name: &'static str,
    setup_fee: i64,
    monthly_fee: i64,
    timeline_weeks: u32,
    includes: &'static [&'static str],
}

impl Package {
    pub const ALL: [Package; 4] = [
        Package::Starter,
        Package::Growth,
        Package::Scale,
        Package::Enterprise,
    ];

    fn spec(&self) -> PackageSpec {
        match self {
            Package::Starter => PackageSpec {
                name: "Starter Automation",
                setup_fee: 3500,
                monthly_fee: 600,
                timeline_weeks: 2,
                includes: &[
                    "1 core workflow (lead capture or follow-up)",
                    "CRM integration",
                    "Email support",
                ],
            },
            Package::Growth => PackageSpec {
                name: "Growth System",
                setup_fee: 7500,
                monthly_fee: 1200,
                timeline_weeks: 4,
                includes: &[
                    "Up to 3 connected workflows",
                    "AI email personalization",
                    "Calendar booking automation",
                    "Monthly performance report",
                ],
            },
            Package::Scale => PackageSpec {
                name: "Scale Engine",
                setup_fee: 15000,
                monthly_fee: 2500,
                timeline_weeks: 6,
                includes: &[
                    "Up to 6 connected workflows",
                    "AI receptionist hand-off",
                    "Multi-channel outreach",
                    "Weekly optimization calls",
                ],
            },
            Package::Enterprise => PackageSpec {
                name: "Enterprise Operations",
                setup_fee: 30000,
                monthly_fee: 5000,
                timeline_weeks: 10,
                includes: &[
                    "Unlimited workflows",
                    "Dedicated automation engineer",
                    "Custom AI model tuning",
                    "Priority support SLA",
                ],
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Package::Starter => "STARTER",
            Package::Growth => "GROWTH",
            Package::Scale => "SCALE",
            Package::Enterprise => "ENTERPRISE",
        }
    }
}

impl FromStr for Package {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Package::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AppError::BadRequest(format!("Unknown package: {}", s)))
    }
}

/// Setup-fee multipliers; they compound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Multiplier {
    HighSecurity,
    RushDelivery,
    ComplexIntegration,
    MultiLocation,
    CustomAiTraining,
}

impl Multiplier {
    pub const ALL: [Multiplier; 5] = [
        Multiplier::HighSecurity,
        Multiplier::RushDelivery,
        Multiplier::ComplexIntegration,
        Multiplier::MultiLocation,
        Multiplier::CustomAiTraining,
    ];

    /// Factor in percent (125 = x1.25).
    fn percent(&self) -> i64 {
        match self {
            Multiplier::HighSecurity => 125,
            Multiplier::RushDelivery => 150,
            Multiplier::ComplexIntegration => 130,
            Multiplier::MultiLocation => 120,
            Multiplier::CustomAiTraining => 140,
        }
    }

    pub fn factor(&self) -> BigDecimal {
        percent(self.percent())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Multiplier::HighSecurity => "highSecurity",
            Multiplier::RushDelivery => "rushDelivery",
            Multiplier::ComplexIntegration => "complexIntegration",
            Multiplier::MultiLocation => "multiLocation",
            Multiplier::CustomAiTraining => "customAiTraining",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Multiplier::HighSecurity => "High-security / compliance requirements",
            Multiplier::RushDelivery => "Rush delivery",
            Multiplier::ComplexIntegration => "Complex legacy integrations",
            Multiplier::MultiLocation => "Multiple locations",
            Multiplier::CustomAiTraining => "Custom AI training",
        }
    }
}

impl FromStr for Multiplier {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Multiplier::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AppError::BadRequest(format!("Unknown multiplier: {}", s)))
    }
}

/// Monthly-fee discounts, each lasting a fixed number of months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Discount {
    Prepay12Months,
    Prepay6Months,
    Nonprofit,
    Referral,
}

impl Discount {
    pub const ALL: [Discount; 4] = [
        Discount::Prepay12Months,
        Discount::Prepay6Months,
        Discount::Nonprofit,
        Discount::Referral,
    ];

    pub fn percent_off(&self) -> i64 {
        match self {
            Discount::Prepay12Months => 20,
            Discount::Prepay6Months => 10,
            Discount::Nonprofit => 15,
            Discount::Referral => 10,
        }
    }

    pub fn months(&self) -> u32 {
        match self {
            Discount::Prepay12Months => 12,
            Discount::Prepay6Months => 6,
            Discount::Nonprofit => 12,
            Discount::Referral => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Discount::Prepay12Months => "prepay12Months",
            Discount::Prepay6Months => "prepay6Months",
            Discount::Nonprofit => "nonprofit",
            Discount::Referral => "referral",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Discount::Prepay12Months => "12-month prepay",
            Discount::Prepay6Months => "6-month prepay",
            Discount::Nonprofit => "Nonprofit rate",
            Discount::Referral => "Referral credit",
        }
    }
}

impl FromStr for Discount {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Discount::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AppError::BadRequest(format!("Unknown discount: {}", s)))
    }
}

fn percent(p: i64) -> BigDecimal {
    BigDecimal::from(p) / BigDecimal::from(100)
}

fn money(value: BigDecimal) -> BigDecimal {
    value.round(2)
}

// ============ Calculations ============

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceOptions {
    #[serde(default)]
    pub multipliers: Vec<Multiplier>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackagePrice {
    pub package: Package,
    pub name: String,
    pub base_setup_fee: BigDecimal,
    pub setup_fee: BigDecimal,
    pub monthly_fee: BigDecimal,
    pub multipliers: Vec<Multiplier>,
    pub combined_multiplier: BigDecimal,
    pub timeline_weeks: u32,
    pub includes: Vec<String>,
}

/// Prices a package. Multipliers scale the setup fee only; a repeated
/// multiplier applies once.
pub fn calculate_package_price(package: Package, options: &PriceOptions) -> PackagePrice {
    let spec = package.spec();

    let mut multipliers: Vec<Multiplier> = Vec::new();
    for m in &options.multipliers {
        if !multipliers.contains(m) {
            multipliers.push(*m);
        }
    }

    let combined = multipliers
        .iter()
        .fold(BigDecimal::from(1), |acc, m| acc * m.factor());
    let base_setup_fee = BigDecimal::from(spec.setup_fee);
    let setup_fee = money(&base_setup_fee * &combined);

    PackagePrice {
        package,
        name: spec.name.to_string(),
        base_setup_fee,
        setup_fee,
        monthly_fee: BigDecimal::from(spec.monthly_fee),
        multipliers,
        combined_multiplier: combined,
        timeline_weeks: spec.timeline_weeks,
        includes: spec.includes.iter().map(|s| s.to_string()).collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountResult {
    pub discount: Discount,
    pub percent_off: i64,
    pub original_monthly_fee: BigDecimal,
    pub new_monthly_fee: BigDecimal,
    pub monthly_savings: BigDecimal,
    pub months: u32,
    pub total_savings: BigDecimal,
}

pub fn calculate_discount(monthly_fee: &BigDecimal, discount: Discount) -> DiscountResult {
    let monthly_savings = money(monthly_fee * percent(discount.percent_off()));
    let new_monthly_fee = money(monthly_fee - &monthly_savings);
    let total_savings = money(&monthly_savings * BigDecimal::from(discount.months()));

    DiscountResult {
        discount,
        percent_off: discount.percent_off(),
        original_monthly_fee: monthly_fee.clone(),
        new_monthly_fee,
        monthly_savings,
        months: discount.months(),
        total_savings,
    }
}

// ============ Proposals ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalRequest {
    pub client_name: String,
    pub package: Package,
    #[serde(default)]
    pub multipliers: Vec<Multiplier>,
    #[serde(default)]
    pub discount: Option<Discount>,
    /// Staff hours the automation saves each month, for the ROI section.
    #[serde(default)]
    pub hours_saved_per_month: Option<u32>,
    /// Dollar value of one staff hour.
    #[serde(default)]
    pub hourly_value: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoiEstimate {
    pub monthly_value: BigDecimal,
    pub annual_value: BigDecimal,
    pub net_first_year: BigDecimal,
    /// Months until cumulative value covers the first-year cost.
    pub payback_months: Option<BigDecimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: Uuid,
    pub client_name: String,
    pub prepared_on: NaiveDate,
    pub price: PackagePrice,
    pub discount: Option<DiscountResult>,
    pub first_year_total: BigDecimal,
    pub roi: Option<RoiEstimate>,
}

pub fn generate_proposal(request: &ProposalRequest) -> Result<Proposal, AppError> {
    let client_name = request.client_name.trim();
    if client_name.is_empty() {
        return Err(AppError::BadRequest("client_name is required".to_string()));
    }

    let price = calculate_package_price(
        request.package,
        &PriceOptions {
            multipliers: request.multipliers.clone(),
        },
    );
    let discount = request
        .discount
        .map(|d| calculate_discount(&price.monthly_fee, d));

    let discounted_months = discount.as_ref().map(|d| d.months.min(12)).unwrap_or(0);
    let discounted_fee = discount
        .as_ref()
        .map(|d| d.new_monthly_fee.clone())
        .unwrap_or_else(|| price.monthly_fee.clone());
    let first_year_total = money(
        &price.setup_fee
            + &discounted_fee * BigDecimal::from(discounted_months)
            + &price.monthly_fee * BigDecimal::from(12 - discounted_months),
    );

    let roi = match (request.hours_saved_per_month, request.hourly_value) {
        (Some(hours), Some(rate)) => Some(estimate_roi(hours, rate, &first_year_total)),
        _ => None,
    };

    tracing::info!(
        "Generated {} proposal for {}: first year {}",
        request.package.as_str(),
        client_name,
        first_year_total
    );

    Ok(Proposal {
        id: Uuid::new_v4(),
        client_name: client_name.to_string(),
        prepared_on: Utc::now().date_naive(),
        price,
        discount,
        first_year_total,
        roi,
    })
}

fn estimate_roi(hours: u32, rate: u32, first_year_total: &BigDecimal) -> RoiEstimate {
    let monthly_value = BigDecimal::from(u64::from(hours) * u64::from(rate));
    let annual_value = &monthly_value * BigDecimal::from(12);
    let net_first_year = money(&annual_value - first_year_total);
    let payback_months = if monthly_value > BigDecimal::from(0) {
        Some((first_year_total.clone() / monthly_value.clone()).round(1))
    } else {
        None
    };

    RoiEstimate {
        monthly_value,
        annual_value,
        net_first_year,
        payback_months,
    }
}

/// `$12,345.00`
pub fn format_money(value: &BigDecimal) -> String {
    let fixed = value.round(2).with_scale(2).to_string();
    let (sign, digits) = match fixed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", fixed.as_str()),
    };
    let (whole, cents) = digits.split_once('.').unwrap_or((digits, "00"));

    let mut grouped = String::new();
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{}${}.{}", sign, grouped, cents)
}

/// Renders a proposal as markdown for email or PDF conversion.
pub fn format_proposal(proposal: &Proposal) -> String {
    let price = &proposal.price;
    let mut out = String::new();

    let _ = writeln!(out, "# Automation Proposal: {}", proposal.client_name);
    let _ = writeln!(
        out,
        "_Prepared {} · Ref {}_\n",
        proposal.prepared_on.format("%B %-d, %Y"),
        proposal.id
    );

    let _ = writeln!(out, "## Package: {} ({})\n", price.name, price.package.as_str());
    for item in &price.includes {
        let _ = writeln!(out, "- {}", item);
    }
    let _ = writeln!(out, "\nEstimated delivery: {} weeks\n", price.timeline_weeks);

    let _ = writeln!(out, "## Investment\n");
    let _ = writeln!(out, "| Item | Amount |");
    let _ = writeln!(out, "|---|---|");
    let _ = writeln!(out, "| Base setup | {} |", format_money(&price.base_setup_fee));
    for m in &price.multipliers {
        let _ = writeln!(out, "| {} | x{} |", m.label(), m.factor().round(2));
    }
    let _ = writeln!(out, "| **Setup fee** | **{}** |", format_money(&price.setup_fee));
    let _ = writeln!(out, "| Monthly retainer | {} |", format_money(&price.monthly_fee));

    if let Some(d) = &proposal.discount {
        let _ = writeln!(
            out,
            "| {} ({}% off, {} months) | {} / month |",
            d.discount.label(),
            d.percent_off,
            d.months,
            format_money(&d.new_monthly_fee)
        );
        let _ = writeln!(out, "| Total savings | {} |", format_money(&d.total_savings));
    }
    let _ = writeln!(
        out,
        "| **First-year total** | **{}** |",
        format_money(&proposal.first_year_total)
    );

    if let Some(roi) = &proposal.roi {
        let _ = writeln!(out, "\n## Expected Return\n");
        let _ = writeln!(out, "- Value of time saved: {} / month", format_money(&roi.monthly_value));
        let _ = writeln!(out, "- Annual value: {}", format_money(&roi.annual_value));
        let _ = writeln!(out, "- Net after first year: {}", format_money(&roi.net_first_year));
        match &roi.payback_months {
            Some(months) => {
                let _ = writeln!(out, "- Payback period: {} months", months);
            }
            None => {
                let _ = writeln!(out, "- Payback period: n/a");
            }
        }
    }

    out
}

/// The five reference configurations used in sales calls.
pub fn example_configurations() -> Vec<ProposalRequest> {
    vec![
        ProposalRequest {
            client_name: "Bright Smile Dental".to_string(),
            package: Package::Starter,
            multipliers: vec![],
            discount: None,
            hours_saved_per_month: None,
            hourly_value: None,
        },
        ProposalRequest {
            client_name: "Hartley & Associates Law".to_string(),
            package: Package::Growth,
            multipliers: vec![Multiplier::HighSecurity],
            discount: Some(Discount::Prepay12Months),
            hours_saved_per_month: Some(40),
            hourly_value: Some(150),
        },
        ProposalRequest {
            client_name: "Summit Realty Group".to_string(),
            package: Package::Scale,
            multipliers: vec![Multiplier::MultiLocation, Multiplier::RushDelivery],
            discount: Some(Discount::Prepay6Months),
            hours_saved_per_month: Some(120),
            hourly_value: Some(60),
        },
        ProposalRequest {
            client_name: "Riverbend Community Clinic".to_string(),
            package: Package::Growth,
            multipliers: vec![Multiplier::HighSecurity, Multiplier::ComplexIntegration],
            discount: Some(Discount::Nonprofit),
            hours_saved_per_month: Some(60),
            hourly_value: Some(45),
        },
        ProposalRequest {
            client_name: "Apex Home Services".to_string(),
            package: Package::Enterprise,
            multipliers: vec![Multiplier::MultiLocation, Multiplier::CustomAiTraining],
            discount: Some(Discount::Referral),
            hours_saved_per_month: Some(200),
            hourly_value: Some(55),
        },
    ]
}
