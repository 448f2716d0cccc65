// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Embedded page templates

use minijinja::Environment;
use serde::Serialize;

use crate::Result;

const BASE: &str = r##"<!DOCTYPE html>
<html lang="{{ locale }}">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{% block title %}{% endblock %} - Raseed</title>
    <style>
        :root {
            --bg-primary: #1a1a2e;
            --bg-secondary: #16213e;
            --bg-card: #0f3460;
            --text-primary: #e8e8e8;
            --text-secondary: #a0a0a0;
            --accent: #e94560;
            --success: #00d9a5;
            --border: #2a2a4a;
        }
        * { box-sizing: border-box; margin: 0; padding: 0; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, 'Noto Sans Telugu', 'Noto Sans Kannada', sans-serif;
            background: var(--bg-primary);
            color: var(--text-primary);
            line-height: 1.6;
        }
        .container { max-width: 1200px; margin: 0 auto; padding: 20px; }
        nav {
            background: var(--bg-secondary);
            padding: 15px 20px;
            display: flex;
            align-items: center;
            gap: 20px;
            border-bottom: 1px solid var(--border);
        }
        nav .logo { font-size: 1.5em; font-weight: bold; color: var(--accent); text-decoration: none; flex: 1; }
        select, button, textarea, input[type=file] {
            background: var(--bg-secondary);
            color: var(--text-primary);
            border: 1px solid var(--border);
            border-radius: 6px;
            padding: 8px 12px;
            font: inherit;
        }
        button { background: var(--accent); border: none; cursor: pointer; }
        .card { background: var(--bg-card); border-radius: 12px; padding: 20px; margin-bottom: 20px; }
        .card h2 { margin-bottom: 15px; color: var(--accent); }
        .stats-grid { display: grid; grid-template-columns: repeat(auto-fit, minmax(200px, 1fr)); gap: 20px; margin-bottom: 20px; }
        .stat-card { background: var(--bg-card); border-radius: 12px; padding: 20px; text-align: center; }
        .stat-card .number { font-size: 2em; font-weight: bold; color: var(--accent); }
        .stat-card .label { color: var(--text-secondary); font-size: 0.9em; }
        .notice { background: var(--bg-secondary); border-left: 4px solid var(--success); padding: 12px 16px; margin-bottom: 20px; border-radius: 6px; }
        table { width: 100%; border-collapse: collapse; }
        th, td { padding: 12px; text-align: left; border-bottom: 1px solid var(--border); }
        th { color: var(--text-secondary); font-weight: 500; }
        .badge { display: inline-block; background: var(--accent); color: white; padding: 2px 8px; border-radius: 12px; font-size: 0.8em; }
        .insight { color: var(--text-secondary); font-size: 0.9em; }
        textarea { width: 100%; min-height: 80px; margin-bottom: 10px; }
        #answer { white-space: pre-wrap; margin-top: 10px; }
    </style>
</head>
<body>
    <nav>
        <a href="/" class="logo">🧾 Raseed</a>
        <select id="language" onchange="setLanguage(this.value)">
            {% for l in locales %}<option value="{{ l.code }}"{% if l.code == locale %} selected{% endif %}>{{ l.name }}</option>{% endfor %}
        </select>
        {% if user %}<span>{{ user.name }}</span><button onclick="logout()">{{ t.logout }}</button>{% endif %}
    </nav>
    <div class="container">
        {% block content %}{% endblock %}
    </div>
    <script>
        async function setLanguage(code) {
            await fetch('/api/update-language', {
                method: 'POST',
                headers: {'Content-Type': 'application/json'},
                body: JSON.stringify({language: code})
            });
            location.reload();
        }
        async function logout() {
            await fetch('/api/logout', {method: 'POST'});
            location.href = '/login';
        }
    </script>
</body>
</html>
"##;

const LOGIN: &str = r##"{% extends "base.html" %}
{% block title %}{{ t.login_title }}{% endblock %}
{% block content %}
<div class="card" style="max-width: 420px; margin: 60px auto; text-align: center;">
    <h2>{{ t.login_title }}</h2>
    {% if error %}<div class="notice">{{ t.session_expired }}</div>{% endif %}
    <a href="/api/auth/google"><button>{{ t.login_with_google }}</button></a>
</div>
{% endblock %}
"##;

const DASHBOARD: &str = r##"{% extends "base.html" %}
{% block title %}{{ t.dashboard_title }}{% endblock %}
{% block content %}
<h1>{{ t.dashboard_title }}</h1>
<p class="insight">{{ t.dashboard_subtitle }}</p>
<br>
{% if notice %}<div class="notice">{{ notice }}</div>{% endif %}

<div class="stats-grid">
    <div class="stat-card"><div class="number">{{ stats.total_receipts }}</div><div class="label">{{ t.total_receipts }}</div></div>
    <div class="stat-card"><div class="number">{{ stats.total_spent }}</div><div class="label">{{ t.total_spent }}</div></div>
    <div class="stat-card"><div class="number">{{ stats.top_category or "-" }}</div><div class="label">{{ t.top_category }}</div></div>
    <div class="stat-card"><div class="number">{{ stats.average_spend }}</div><div class="label">{{ t.avg_spend }}</div></div>
</div>

<div class="card">
    <h2>{{ t.upload_receipt }}</h2>
    <form action="/upload" method="post" enctype="multipart/form-data">
        <input type="file" name="receipt" accept="image/*" required>
        <button type="submit">{{ t.process_btn }}</button>
    </form>
    <p class="insight">{{ t.upload_supported }}</p>
</div>

<div class="card">
    <h2>{{ t.ai_assistant }}</h2>
    <textarea id="question" placeholder="{{ t.ai_placeholder }}"></textarea>
    <button onclick="ask()">{{ t.ask_ai }}</button>
    <div id="answer"></div>
</div>

<div class="card">
    <h2>{{ t.your_receipts }}</h2>
    {% if receipts %}
    <table>
        <tbody>
        {% for r in receipts %}
            <tr>
                <td>{{ r.merchant }}<div class="insight">{{ r.insight or "" }}</div></td>
                <td>{{ r.date or "-" }}</td>
                <td>{{ r.total }} {{ r.currency }}</td>
                <td><span class="badge">{{ r.category }}</span></td>
            </tr>
        {% endfor %}
        </tbody>
    </table>
    {% else %}
    <p>{{ t.no_receipts }}</p>
    {% endif %}
</div>

<script>
    async function ask() {
        const query = document.getElementById('question').value;
        const out = document.getElementById('answer');
        const res = await fetch('/api/process-query', {
            method: 'POST',
            headers: {'Content-Type': 'application/json'},
            body: JSON.stringify({query})
        });
        const body = await res.json();
        out.textContent = body.success ? body.response : (body.message || body.error);
    }
</script>
{% endblock %}
"##;

/// Language choice offered in the navigation bar
#[derive(Serialize)]
pub struct LocaleOption {
    pub code: &'static str,
    pub name: &'static str,
}

pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("base.html", BASE)?;
        env.add_template("login.html", LOGIN)?;
        env.add_template("dashboard.html", DASHBOARD)?;
        Ok(Self { env })
    }

    pub fn render<S: Serialize>(&self, name: &str, ctx: S) -> Result<String> {
        let template = self.env.get_template(name)?;
        Ok(template.render(ctx)?)
    }
}

pub fn locale_options() -> Vec<LocaleOption> {
    crate::i18n::Locale::ALL
        .iter()
        .map(|l| LocaleOption { code: l.code(), name: l.native_name() })
        .collect()
}
