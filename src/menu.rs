//! Menu texts and inline-keyboard builders. Pure presentation: everything
//! here turns records and reports into [`Reply`] values.

use crate::config::Config;
use crate::keys::conversation::{DELETE_KEY_MSG_TOKEN, SHOW_KEY_TOKEN_PREFIX};
use crate::keys::models::CredentialRecord;
use crate::reply::Reply;
use crate::telemetry::{format_bytes, format_uptime, HostReport};

/// Callback tokens shared between keyboard builders and the dispatcher.
pub mod token {
    pub const MAIN_MENU: &str = "main_menu";
    pub const BACK: &str = "back";
    pub const ADMIN_MENU: &str = "admin_menu";
    pub const ADMIN_SERVER_INFO: &str = "admin_server_info";
    pub const ADMIN_KEYS: &str = "admin_outline_keys";
    pub const ADMIN_API_INFO: &str = "admin_api_info";
    pub const HELP: &str = "help";
    pub const ABOUT: &str = "about";
    pub const INSTRUCTIONS: &str = "instructions";
    pub const CREATE_KEY: &str = "outline_create_key";
    pub const LIST_KEYS: &str = "outline_list_keys";
    pub const SELECT_USER_PREFIX: &str = "select_user:";
    pub const SEND_KEY_PREFIX: &str = "send_key:";
}

pub fn user_welcome() -> Reply {
    Reply::text("👋 Welcome! Click to create your Outline key:")
        .with_choice("Create Key", token::CREATE_KEY)
        .with_choice("Instruction", token::INSTRUCTIONS)
        .with_choice("📚 Help", token::HELP)
        .with_choice("❓ About", token::ABOUT)
}

pub fn admin_menu() -> Reply {
    Reply::text("👨‍💼 Admin Panel")
        .with_choice("📊 Server Info", token::ADMIN_SERVER_INFO)
        .with_choice("🔑 Manage Outline Keys", token::ADMIN_KEYS)
        .with_choice("⚙️ API Configuration", token::ADMIN_API_INFO)
        .with_choice("🔙 Back", token::BACK)
}

pub fn keys_menu() -> Reply {
    Reply::text("🔑 Outline Keys")
        .with_choice("➕ Create New Key", token::CREATE_KEY)
        .with_choice("📋 List Keys", token::LIST_KEYS)
        .with_choice("🔙 Back", token::ADMIN_MENU)
}

pub fn keys_list(records: &[CredentialRecord]) -> Reply {
    if records.is_empty() {
        return Reply::html("📋 <b>Outline Access Keys</b>\n\nNo access keys found.")
            .with_choice("🏠 Back", token::ADMIN_MENU);
    }
    let mut reply =
        Reply::html("📋 <b>Outline Access Keys</b>\n\nSelect a user below to view their key:")
            .with_choice("➕ Generate Another Key", token::CREATE_KEY);
    for record in records {
        reply = reply.with_choice(
            &record.label,
            format!("{}{}", token::SELECT_USER_PREFIX, record.internal_id),
        );
    }
    reply.with_choice("🔙 Back", token::ADMIN_MENU)
}

pub fn user_detail(record: &CredentialRecord) -> Reply {
    Reply::html(format!(
        "👤 <b>{}</b>\n🆔 <code>{}</code>\n🔑 <b>Outline Key:</b> <tg-spoiler><code>{}</code></tg-spoiler>",
        record.label, record.owner_identity, record.credential_material
    ))
    .with_choice(
        "📤 Send Key",
        format!("{}{}", token::SEND_KEY_PREFIX, record.owner_identity),
    )
    .with_choice(
        "🔑 Show Key",
        format!("{SHOW_KEY_TOKEN_PREFIX}{}", record.internal_id),
    )
    .with_choice("◀ Back", token::LIST_KEYS)
}

pub fn revealed_key(record: &CredentialRecord) -> Reply {
    Reply::html(format!(
        "🔑 <b>Outline Access Key for {}</b>\n\n<tg-spoiler><code>{}</code></tg-spoiler>",
        record.label, record.credential_material
    ))
    .with_choice("🗑 Delete Message", DELETE_KEY_MSG_TOKEN)
    .with_choice(
        "📤 Send to Owner",
        format!("{}{}", token::SEND_KEY_PREFIX, record.owner_identity),
    )
}

pub fn server_info(report: &HostReport) -> Reply {
    Reply::html(format!(
        "📊 <b>Server Information</b>\n\n\
         ⏱️ <b>Uptime:</b> {}\n\n\
         🖥️ <b>CPU Usage:</b> {:.2}%\n\n\
         💾 <b>Memory:</b>\n   Used: {}\n   Total: {}\n   Usage: {:.2}%\n\n\
         💿 <b>Disk:</b>\n   Used: {}\n   Total: {}\n   Usage: {:.2}%",
        format_uptime(report.uptime_secs),
        report.cpu_percent,
        format_bytes(report.mem.used),
        format_bytes(report.mem.total),
        report.mem.percentage(),
        format_bytes(report.disk.used),
        format_bytes(report.disk.total),
        report.disk.percentage(),
    ))
    .with_choice("🔄 Refresh", token::ADMIN_SERVER_INFO)
    .with_choice("🔙 Back", token::ADMIN_MENU)
}

pub fn api_info(config: &Config) -> Reply {
    Reply::html(format!(
        "⚙️ <b>API Configuration</b>\n\n\
         🔗 <b>Outline API URL:</b> {}\n\
         📌 <b>Certificate pinned:</b> {}\n\
         👥 <b>Admin ID:</b> {}",
        config.outline_api_url,
        if config.outline_cert_sha256.is_some() {
            "yes"
        } else {
            "no"
        },
        config.admin_id,
    ))
    .with_choice("🔙 Back", token::ADMIN_MENU)
}

pub fn help_text() -> Reply {
    Reply::html(
        "📚 <b>Help</b>\n\n\
         <b>Available Commands:</b>\n\
         /start - Show main menu\n\
         /admin - Open admin panel\n\
         /help - Show this help message\n\
         /about - Show about information\n\
         /instruction - Client app setup guide\n\
         /cancel - Abort the current operation\n\n\
         <b>Admin Features:</b>\n\
         • Monitor server resources (CPU, memory, disk, uptime)\n\
         • Create and manage Outline VPN access keys\n\
         • View API configuration",
    )
    .with_choice("🔙 Back", token::MAIN_MENU)
}

pub fn about_text() -> Reply {
    Reply::html(
        "❓ <b>About This Bot</b>\n\n\
         <b>Shaddy VPN Bot</b>\nVersion: 0.1.0\n\n\
         <b>Features:</b>\n\
         ✅ Admin panel for server management\n\
         ✅ Outline VPN key generation\n\
         ✅ Real-time server monitoring\n\n\
         For issues or suggestions, contact the administrator.",
    )
    .with_choice("🔙 Back", token::MAIN_MENU)
}

pub fn instruction_text() -> Reply {
    Reply::text(
        "📌 How to use your Outline key:\n\n\
         1️⃣ Download a client app:\n\
         (All systems) Karing: https://karing.app/en/download/\n\
         (iOS) Streisand: https://streisandapp.com\n\
         (All systems, no iOS) v2rayNG: https://github.com/2dust/v2rayNG/releases\n\n\
         2️⃣ Copy your key, open the app and use \"Import from clipboard\".\n\n\
         3️⃣ All done! Use it.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::models::CipherSuite;

    fn record() -> CredentialRecord {
        CredentialRecord {
            internal_id: 5,
            owner_identity: 42,
            label: "laptop".into(),
            cipher_suite: CipherSuite::Aes256Gcm,
            credential_material: "ss://secret".into(),
        }
    }

    #[test]
    fn welcome_menu_reaches_every_user_facing_screen() {
        let reply = user_welcome();
        let tokens: Vec<&str> = reply.choices.iter().map(|c| c.token.as_str()).collect();
        assert_eq!(
            tokens,
            vec![token::CREATE_KEY, token::INSTRUCTIONS, token::HELP, token::ABOUT]
        );
    }

    #[test]
    fn key_list_offers_one_entry_per_record() {
        let reply = keys_list(&[record()]);
        assert!(reply
            .choices
            .iter()
            .any(|choice| choice.token == "select_user:5"));
    }

    #[test]
    fn detail_and_reveal_keep_material_spoilered() {
        for reply in [user_detail(&record()), revealed_key(&record())] {
            assert!(reply.html);
            assert!(reply.text.contains("<tg-spoiler><code>ss://secret</code></tg-spoiler>"));
        }
    }
}
