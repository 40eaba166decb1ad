//! Weekly meal plans, keyed by day index.
//!
//! Unlike the other kinds, a meal plan is a dictionary: the local copy is a
//! JSON object keyed by day, and each remote document id is the day key.

use crate::{error::Result, DataKind, Document, Error, SyncRecord, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Share of the daily targets given to breakfast, lunch and dinner.
const MEAL_RATIOS: [(&str, f64); 3] = [("Breakfast", 0.25), ("Lunch", 0.35), ("Dinner", 0.40)];

/// Days in a generated plan.
pub const DAYS_PER_WEEK: usize = 7;

/// A single meal with its macros.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meal {
    pub name: String,
    pub cals: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

impl Meal {
    pub fn new(name: impl Into<String>, cals: f64, protein: f64, carbs: f64, fat: f64) -> Self {
        Self {
            name: name.into(),
            cals,
            protein,
            carbs,
            fat,
        }
    }
}

/// The three meals of one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayMeals {
    pub breakfast: Meal,
    pub lunch: Meal,
    pub dinner: Meal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
}

impl DayMeals {
    /// Summed macros of the three meals.
    pub fn totals(&self) -> Meal {
        let meals = [&self.breakfast, &self.lunch, &self.dinner];
        Meal {
            name: "Total".to_string(),
            cals: meals.iter().map(|m| m.cals).sum(),
            protein: meals.iter().map(|m| m.protein).sum(),
            carbs: meals.iter().map(|m| m.carbs).sum(),
            fat: meals.iter().map(|m| m.fat).sum(),
        }
    }
}

/// One day of a meal plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealPlanEntry {
    /// Day index rendered as a string ("0" is Monday)
    pub day: String,
    pub meals: DayMeals,
}

impl MealPlanEntry {
    pub fn new(day: impl Into<String>, meals: DayMeals) -> Self {
        Self {
            day: day.into(),
            meals,
        }
    }

    pub fn stamped(mut self, now: Timestamp) -> Self {
        self.meals.updated_at = Some(now);
        self
    }
}

impl SyncRecord for MealPlanEntry {
    const KIND: DataKind = DataKind::MealPlans;
    type Key = String;

    fn identity_key(&self) -> String {
        self.day.clone()
    }

    fn validate(&self) -> Result<()> {
        if self.day.trim().is_empty() {
            return Err(Error::invalid(Self::KIND, "day key must not be blank"));
        }
        let meals = [&self.meals.breakfast, &self.meals.lunch, &self.meals.dinner];
        if let Some(meal) = meals
            .iter()
            .find(|m| [m.cals, m.protein, m.carbs, m.fat].iter().any(|v| !v.is_finite() || *v < 0.0))
        {
            return Err(Error::invalid(
                Self::KIND,
                format!("meal '{}' on day {} has invalid macros", meal.name, self.day),
            ));
        }
        Ok(())
    }

    fn document_id(&self) -> Option<String> {
        Some(self.day.clone())
    }

    fn from_document(doc: &Document) -> Result<Self> {
        let meals = serde_json::from_value(doc.data.clone()).map_err(|e| Error::MalformedDocument {
            kind: Self::KIND,
            id: doc.id.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(doc.id.clone(), meals))
    }

    fn to_document_data(&self) -> Result<serde_json::Value> {
        serde_json::to_value(&self.meals).map_err(|e| Error::encode(Self::KIND, e))
    }

    fn encode_local(records: &[Self]) -> Result<String> {
        let plan: BTreeMap<&str, &DayMeals> =
            records.iter().map(|e| (e.day.as_str(), &e.meals)).collect();
        serde_json::to_string(&plan).map_err(|e| Error::encode(Self::KIND, e))
    }

    fn decode_local(text: &str) -> Result<Vec<Self>> {
        let plan: BTreeMap<String, DayMeals> =
            serde_json::from_str(text).map_err(|e| Error::MalformedCollection {
                kind: Self::KIND,
                reason: e.to_string(),
            })?;
        Ok(plan
            .into_iter()
            .map(|(day, meals)| MealPlanEntry::new(day, meals))
            .collect())
    }
}

/// Daily macro targets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroTargets {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Build a seven-day plan that splits the daily targets across meals.
///
/// Calories are rounded to whole numbers, the other macros to one decimal.
pub fn default_week_plan(targets: MacroTargets) -> Vec<MealPlanEntry> {
    let meal = |(name, ratio): (&str, f64)| {
        Meal::new(
            name,
            (targets.calories * ratio).round(),
            round_tenths(targets.protein * ratio),
            round_tenths(targets.carbs * ratio),
            round_tenths(targets.fat * ratio),
        )
    };

    (0..DAYS_PER_WEEK)
        .map(|day| {
            MealPlanEntry::new(
                day.to_string(),
                DayMeals {
                    breakfast: meal(MEAL_RATIOS[0]),
                    lunch: meal(MEAL_RATIOS[1]),
                    dinner: meal(MEAL_RATIOS[2]),
                    updated_at: None,
                },
            )
        })
        .collect()
}
