//! Prompt templates and response schemas for the coach service
//!
//! Prompts are written in Russian; the model answers in the same language.

use anyhow::{Context, Result};
use serde_json::{Value, json};

use crate::providers::types::{Mode, PlanRequest};

/// Situation description handed to the model for each mode
pub fn mode_context(mode: Mode) -> &'static str {
    match mode {
        Mode::Chaos => {
            "АНТИХАОС: Всё развалилось. Нужна глубокая поддержка и микро-действие (дыхание, одно слово)."
        }
        Mode::Sprint => "СПРИНТ: Есть энергия. Нужен рывок, но без перегруза.",
        Mode::Turtle => "ЧЕРЕПАХА: Медленный, но верный шаг на 5-10 минут.",
    }
}

/// Prompt asking for today's message, step and inspiration
pub fn daily_plan_prompt(request: &PlanRequest) -> Result<String> {
    let history =
        serde_json::to_string(&request.history).context("Failed to serialize history for prompt")?;

    Ok(format!(
        "Имя пользователя: {name}\n\
         Цель: {goal}\n\
         История (последние 3 дня): {history}\n\
         Текущий режим: {mode}\n\
         \n\
         Задача:\n\
         1. Напиши сообщение поддержки пользователю (на русском).\n\
         2. Дай один конкретный микро-шаг на сегодня.\n\
         3. Подбери цитату успешного русского человека (исторического или современного), \
         краткую биографию и его \"инструменты успеха\" (привычки, методы).\n\
         \n\
         Формат: JSON.",
        name = request.user_name,
        goal = request.goal,
        history = history,
        mode = mode_context(request.mode),
    ))
}

pub const BIOGRAPHIES_PROMPT: &str = "Предоставь 5 кратких биографий успешных русских людей, \
    которые сделали себя сами (с нуля). Для каждого укажи: имя, главную мысль/цитату, путь через \
    ошибки и конкретные инструменты/привычки, которые они использовали.";

pub fn inspiration_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "person": { "type": "STRING" },
            "quote": { "type": "STRING" },
            "bio": { "type": "STRING" },
            "tools": { "type": "STRING" }
        },
        "required": ["person", "quote", "bio", "tools"]
    })
}

pub fn daily_plan_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "message": { "type": "STRING" },
            "step": { "type": "STRING" },
            "inspiration": inspiration_schema()
        },
        "required": ["message", "step", "inspiration"]
    })
}

pub fn biographies_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": inspiration_schema()
    })
}

/// What gets read aloud for the day
pub fn narration_text(message: &str, step: &str) -> String {
    format!("{}. Твой шаг на сегодня: {}", message, step)
}

/// Message shown once the day's check-in is recorded
pub fn day_complete_message(user_name: &str) -> String {
    format!("Отлично, {}. На сегодня путь завершен. Отдыхай.", user_name)
}
