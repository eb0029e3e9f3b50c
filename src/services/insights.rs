//! Business logic behind the paid endpoints.
//!
//! These are simulations: static reference tables plus scores derived from a
//! SHA-256 of the input, so the same input always yields the same answer.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::AppError;

/// Map `seed` to a stable score in `[0, scale)`.
fn score(seed: &[u8], scale: f64) -> f64 {
    let digest = Sha256::digest(seed);
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(head) as f64 / u64::MAX as f64) * scale
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Deserialize)]
pub struct EmployerQuery {
    pub name: Option<String>,
    pub ein: Option<String>,
}

pub fn lookup_employer(query: &EmployerQuery) -> Result<Value, AppError> {
    let name = query.name.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let ein = query.ein.as_deref().map(str::trim).filter(|s| !s.is_empty());
    if name.is_none() && ein.is_none() {
        return Err(AppError::InvalidRequest(
            "Employer name or EIN required".to_string(),
        ));
    }

    let employer = match name.map(str::to_ascii_lowercase).as_deref() {
        Some("google") => json!({"name": "Google LLC", "verified": true, "industry": "Technology", "employees": "150000+", "rating": "A+"}),
        Some("amazon") => json!({"name": "Amazon.com Inc", "verified": true, "industry": "E-commerce/Cloud", "employees": "1500000+", "rating": "A+"}),
        Some("walmart") => json!({"name": "Walmart Inc", "verified": true, "industry": "Retail", "employees": "2300000+", "rating": "A"}),
        _ => json!({"name": name.unwrap_or("Unknown"), "verified": false, "industry": "Unknown", "employees": "Unknown", "rating": "Not rated"}),
    };
    let verified = employer["verified"].as_bool().unwrap_or(false);

    Ok(json!({
        "employer": employer,
        "lookup_type": if ein.is_some() { "ein" } else { "name" },
        "confidence": if verified { 0.95 } else { 0.3 },
    }))
}

#[derive(Debug, Deserialize)]
pub struct RegionQuery {
    pub country: Option<String>,
    pub state: Option<String>,
}

pub fn region_data(query: &RegionQuery) -> Result<Value, AppError> {
    let country = query
        .country
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::InvalidRequest("Country code required".to_string()))?
        .to_ascii_uppercase();

    let region = match country.as_str() {
        "US" => json!({"country": "United States", "currency": "USD", "median_income": 65000, "cost_of_living_index": 100, "unemployment_rate": 3.7, "min_wage": 7.25, "tax_rate_range": "10%-37%"}),
        "UK" => json!({"country": "United Kingdom", "currency": "GBP", "median_income": 31000, "cost_of_living_index": 95, "unemployment_rate": 4.2, "min_wage": 10.42, "tax_rate_range": "20%-45%"}),
        "NG" => json!({"country": "Nigeria", "currency": "NGN", "median_income": 2400000, "cost_of_living_index": 35, "unemployment_rate": 33.3, "min_wage": 30000, "tax_rate_range": "7%-24%"}),
        _ => json!({"country": country, "currency": "Unknown", "median_income": null, "cost_of_living_index": null, "unemployment_rate": null, "min_wage": null, "tax_rate_range": "Unknown"}),
    };

    Ok(json!({
        "region": region,
        "state": query.state,
        "data_source": "regional statistics snapshot",
        "last_updated": Utc::now().date_naive().to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct IncomeRequest {
    pub job_title: Option<String>,
    pub industry: Option<String>,
    pub location: Option<String>,
    pub experience_years: Option<f64>,
    pub education: Option<String>,
}

pub fn predict_income(request: &IncomeRequest) -> Result<Value, AppError> {
    let job_title = request
        .job_title
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::InvalidRequest("Job title required".to_string()))?;

    let industry_multiplier = match request.industry.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("technology") => 1.5,
        Some("finance") => 1.4,
        Some("healthcare") => 1.2,
        Some("retail") => 0.8,
        _ => 1.0,
    };
    let education_multiplier = match request.education.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("phd") => 1.3,
        Some("masters") => 1.2,
        Some("bachelors") => 1.1,
        _ => 1.0,
    };
    let experience = request.experience_years.unwrap_or(0.0).max(0.0);
    let experience_multiplier = (1.0 + experience * 0.05).min(2.0);

    let salary = (50_000.0 * industry_multiplier * experience_multiplier * education_multiplier).round();

    Ok(json!({
        "prediction": {
            "annual_salary_low": (salary * 0.8).round(),
            "annual_salary_mid": salary,
            "annual_salary_high": (salary * 1.25).round(),
            "monthly_gross": (salary / 12.0).round(),
            "monthly_net_estimate": (salary / 12.0 * 0.75).round(),
            "confidence": 0.72,
        },
        "factors": {
            "job_title": job_title,
            "industry": request.industry.as_deref().unwrap_or("general"),
            "experience_years": experience,
            "education": request.education.as_deref().unwrap_or("not specified"),
            "location": request.location.as_deref().unwrap_or("US average"),
        },
    }))
}

#[derive(Debug, Deserialize)]
pub struct DocumentRequest {
    pub document_type: Option<String>,
    pub document_data: Option<String>,
}

pub fn analyze_document(request: &DocumentRequest) -> Result<Value, AppError> {
    let (Some(document_type), Some(document_data)) = (
        request.document_type.as_deref().filter(|s| !s.is_empty()),
        request.document_data.as_deref().filter(|s| !s.is_empty()),
    ) else {
        return Err(AppError::InvalidRequest(
            "document_type and document_data required".to_string(),
        ));
    };

    let risk = score(document_data.as_bytes(), 100.0);
    let mut fraud_signals = Vec::new();
    if risk > 70.0 {
        fraud_signals.push(json!({"type": "inconsistent_metadata", "severity": "medium"}));
    }
    if risk > 85.0 {
        fraud_signals.push(json!({"type": "potential_manipulation", "severity": "high"}));
    }
    let risk_level = if risk < 30.0 {
        "low"
    } else if risk < 70.0 {
        "medium"
    } else {
        "high"
    };
    let recommendations = if risk > 60.0 {
        json!(["Request additional verification", "Cross-reference with employer"])
    } else {
        json!(["Document verified", "Proceed with processing"])
    };

    Ok(json!({
        "analysis_id": Uuid::new_v4(),
        "document_type": document_type,
        "results": {
            "risk_score": round2(risk),
            "risk_level": risk_level,
            "fraud_signals": fraud_signals,
            "income_estimate": {
                "stability": if risk < 50.0 { "stable" } else { "variable" },
            },
            "recommendations": recommendations,
        },
    }))
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub data_points: Option<Vec<Value>>,
}

pub fn scan(request: &ScanRequest) -> Result<Value, AppError> {
    let points = request
        .data_points
        .as_ref()
        .filter(|points| !points.is_empty())
        .ok_or_else(|| AppError::InvalidRequest("data_points array required".to_string()))?;

    let mut signals = Vec::new();
    let mut total_risk = 0.0;
    for (index, point) in points.iter().enumerate() {
        let point_risk = score(point.to_string().as_bytes(), 50.0);
        total_risk += point_risk;
        if point_risk > 30.0 && signals.len() < 10 {
            signals.push(json!({
                "index": index,
                "type": "anomaly_detected",
                "risk": point_risk.round(),
                "detail": format!("Data point {index} shows unusual patterns"),
            }));
        }
    }
    let average = total_risk / points.len() as f64;

    Ok(json!({
        "scan_id": Uuid::new_v4(),
        "data_points_analyzed": points.len(),
        "overall_risk": average.round(),
        "risk_level": if average < 20.0 { "low" } else if average < 40.0 { "medium" } else { "high" },
        "signals": signals,
        "recommendation": if average > 40.0 { "Manual review recommended" } else { "Data appears legitimate" },
    }))
}
