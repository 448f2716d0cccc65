// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Supported UI languages and their string tables

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::RaseedError;

/// UI locale chosen by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Locale {
    #[default]
    #[serde(rename = "en")]
    English,
    #[serde(rename = "te")]
    Telugu,
    #[serde(rename = "kn")]
    Kannada,
}

impl Locale {
    pub const ALL: [Locale; 3] = [Locale::English, Locale::Telugu, Locale::Kannada];

    pub fn code(&self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Telugu => "te",
            Self::Kannada => "kn",
        }
    }

    /// Name of the language written in that language
    pub fn native_name(&self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Telugu => "తెలుగు",
            Self::Kannada => "ಕನ್ನಡ",
        }
    }

    /// Name used when instructing the language model
    pub fn english_name(&self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Telugu => "Telugu",
            Self::Kannada => "Kannada",
        }
    }

    /// Date formats to try, most likely first. Indian receipts print day first.
    pub fn date_formats(&self) -> Vec<String> {
        let formats: &[&str] = match self {
            Self::English => &[
                "%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%m/%d/%y", "%d/%m/%y",
                "%d-%m-%Y", "%d.%m.%Y", "%d %b %Y", "%b %d %Y", "%d %B %Y", "%B %d %Y",
            ],
            Self::Telugu | Self::Kannada => &[
                "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%d/%m/%y", "%d-%m-%y",
                "%Y-%m-%d", "%d %b %Y", "%d %B %Y", "%b %d %Y", "%m/%d/%Y",
            ],
        };
        formats.iter().map(|f| f.to_string()).collect()
    }

    pub fn texts(&self) -> &'static Texts {
        match self {
            Self::English => &EN,
            Self::Telugu => &TE,
            Self::Kannada => &KN,
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Locale {
    type Err = RaseedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" => Ok(Self::English),
            "te" => Ok(Self::Telugu),
            "kn" => Ok(Self::Kannada),
            other => Err(RaseedError::InvalidInput(format!("unsupported language '{}'", other))),
        }
    }
}

/// Translated UI strings
#[derive(Debug, Serialize)]
pub struct Texts {
    pub dashboard_title: &'static str,
    pub dashboard_subtitle: &'static str,
    pub login_title: &'static str,
    pub login_with_google: &'static str,
    pub upload_receipt: &'static str,
    pub upload_supported: &'static str,
    pub process_btn: &'static str,
    pub ai_assistant: &'static str,
    pub ai_placeholder: &'static str,
    pub ask_ai: &'static str,
    pub your_receipts: &'static str,
    pub no_receipts: &'static str,
    pub logout: &'static str,
    pub total_receipts: &'static str,
    pub total_spent: &'static str,
    pub top_category: &'static str,
    pub avg_spend: &'static str,
    pub receipt_processed: &'static str,
    pub could_not_read: &'static str,
    pub saved_unanalyzed: &'static str,
    pub could_not_save: &'static str,
    pub session_expired: &'static str,
}

static EN: Texts = Texts {
    dashboard_title: "🧾 Raseed Dashboard",
    dashboard_subtitle: "AI-powered receipt processing and analysis",
    login_title: "Sign in to Raseed",
    login_with_google: "Continue with Google",
    upload_receipt: "📸 Upload Receipt",
    upload_supported: "Supports JPG, PNG, GIF",
    process_btn: "Process Receipt",
    ai_assistant: "🤖 AI Assistant",
    ai_placeholder: "Ask about your spending, receipts, or get financial insights...",
    ask_ai: "Ask AI",
    your_receipts: "📋 Your Receipts",
    no_receipts: "No receipts found. Upload your first receipt!",
    logout: "Logout",
    total_receipts: "Total Receipts",
    total_spent: "Total Spent",
    top_category: "Top Category",
    avg_spend: "Avg. per Receipt",
    receipt_processed: "✅ Receipt Processed Successfully!",
    could_not_read: "❌ Could not read the receipt. Please retake the photo.",
    saved_unanalyzed: "⚠️ Could not analyze the receipt, saved it anyway. Analysis will be retried.",
    could_not_save: "❌ Could not save the receipt. Please try again.",
    session_expired: "Your session expired. Please sign in again.",
};

static TE: Texts = Texts {
    dashboard_title: "🧾 రసీద్ డాష్బోర్డ్",
    dashboard_subtitle: "AI-శక్తితో రసీద్ ప్రాసెసింగ్ మరియు విశ్లేషణ",
    login_title: "రసీద్‌కు సైన్ ఇన్ చేయండి",
    login_with_google: "Google తో కొనసాగించండి",
    upload_receipt: "📸 రసీద్ అప్లోడ్ చేయండి",
    upload_supported: "JPG, PNG, GIF లను మద్దతు ఇస్తుంది",
    process_btn: "రసీద్ ప్రాసెస్ చేయండి",
    ai_assistant: "🤖 AI సహాయకుడు",
    ai_placeholder: "మీ ఖర్చులు, రసీదులు గురించి అడగండి లేదా ఆర్థిక అంతర్దృష్టులను పొందండి...",
    ask_ai: "AI ని అడగండి",
    your_receipts: "📋 మీ రసీదులు",
    no_receipts: "రసీదులు కనుగొనబడలేదు. మీ మొదటి రసీదును అప్లోడ్ చేయండి!",
    logout: "లాగ్ అవుట్",
    total_receipts: "మొత్తం రసీదులు",
    total_spent: "మొత్తం ఖర్చు",
    top_category: "అత్యధిక వర్గం",
    avg_spend: "ప్రతి రసీదుకు సగటు ఖర్చు",
    receipt_processed: "✅ రసీదు విజయవంతంగా ప్రాసెస్ చేయబడింది!",
    could_not_read: "❌ రసీదును చదవలేకపోయాము. దయచేసి మళ్ళీ ఫోటో తీయండి.",
    saved_unanalyzed: "⚠️ రసీదును విశ్లేషించలేకపోయాము, అయినా సేవ్ చేశాము. విశ్లేషణ తర్వాత మళ్ళీ ప్రయత్నించబడుతుంది.",
    could_not_save: "❌ రసీదును సేవ్ చేయలేకపోయాము. దయచేసి మళ్ళీ ప్రయత్నించండి.",
    session_expired: "మీ సెషన్ ముగిసింది. దయచేసి మళ్ళీ సైన్ ఇన్ చేయండి.",
};

static KN: Texts = Texts {
    dashboard_title: "🧾 ರಸೀದ್ ಡ್ಯಾಶ್‌ಬೋರ್ಡ್",
    dashboard_subtitle: "AI-ಶಕ್ತಿಯುತ ರಸೀದಿ ಸಂಸ್ಕರಣೆ ಮತ್ತು ವಿಶ್ಲೇಷಣೆ",
    login_title: "ರಸೀದ್‌ಗೆ ಸೈನ್ ಇನ್ ಮಾಡಿ",
    login_with_google: "Google ನೊಂದಿಗೆ ಮುಂದುವರಿಸಿ",
    upload_receipt: "📸 ರಸೀದಿ ಅಪ್‌ಲೋಡ್ ಮಾಡಿ",
    upload_supported: "JPG, PNG, GIF ಗಳನ್ನು ಬೆಂಬಲಿಸುತ್ತದೆ",
    process_btn: "ರಸೀದಿ ಸಂಸ್ಕರಿಸಿ",
    ai_assistant: "🤖 AI ಸಹಾಯಕ",
    ai_placeholder: "ನಿಮ್ಮ ಖರ್ಚು, ರಸೀದಿಗಳ ಬಗ್ಗೆ ಕೇಳಿ ಅಥವಾ ಆರ್ಥಿಕ ಒಳನೋಟಗಳನ್ನು ಪಡೆಯಿರಿ...",
    ask_ai: "AI ಗೆ ಕೇಳಿ",
    your_receipts: "📋 ನಿಮ್ಮ ರಸೀದಿಗಳು",
    no_receipts: "ರಸೀದಿಗಳು ಕಂಡುಬಂದಿಲ್ಲ. ನಿಮ್ಮ ಮೊದಲ ರಸೀದಿಯನ್ನು ಅಪ್‌ಲೋಡ್ ಮಾಡಿ!",
    logout: "ಲಾಗ್ ಔಟ್",
    total_receipts: "ಒಟ್ಟು ರಸೀದಿಗಳು",
    total_spent: "ಒಟ್ಟು ಖರ್ಚು",
    top_category: "ಅಗ್ರ ವರ್ಗ",
    avg_spend: "ಪ್ರತಿ ರಸೀದಿಗೆ ಸರಾಸರಿ ಖರ್ಚು",
    receipt_processed: "✅ ರಸೀದಿ ಯಶಸ್ವಿಯಾಗಿ ಸಂಸ್ಕರಿಸಲ್ಪಟ್ಟಿದೆ!",
    could_not_read: "❌ ರಸೀದಿಯನ್ನು ಓದಲಾಗಲಿಲ್ಲ. ದಯವಿಟ್ಟು ಮತ್ತೆ ಫೋಟೋ ತೆಗೆಯಿರಿ.",
    saved_unanalyzed: "⚠️ ರಸೀದಿಯನ್ನು ವಿಶ್ಲೇಷಿಸಲಾಗಲಿಲ್ಲ, ಆದರೂ ಉಳಿಸಲಾಗಿದೆ. ವಿಶ್ಲೇಷಣೆಯನ್ನು ನಂತರ ಮತ್ತೆ ಪ್ರಯತ್ನಿಸಲಾಗುತ್ತದೆ.",
    could_not_save: "❌ ರಸೀದಿಯನ್ನು ಉಳಿಸಲಾಗಲಿಲ್ಲ. ದಯವಿಟ್ಟು ಮತ್ತೆ ಪ್ರಯತ್ನಿಸಿ.",
    session_expired: "ನಿಮ್ಮ ಸೆಷನ್ ಮುಕ್ತಾಯವಾಗಿದೆ. ದಯವಿಟ್ಟು ಮತ್ತೆ ಸೈನ್ ಇನ್ ಮಾಡಿ.",
};
