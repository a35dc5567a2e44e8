// Portal pages
//
// Every user-supplied value goes through `Escaped` on its way into the
// markup; the fixed fragments are trusted.

use alloc::string::String;
use core::fmt::{self, Write};

use crate::identity::DeviceIdentity;
use crate::provisioning::ConfigError;
use crate::store::DeviceProfile;

const STYLE: &str = "body{font-family:Arial,sans-serif;background:#f2f2f2;text-align:center;padding-top:60px;}\
.card{background:white;margin:0 auto;padding:25px;border-radius:10px;max-width:350px;box-shadow:0 0 10px rgba(0,0,0,0.15);}\
h2{color:#333;margin-bottom:20px;}\
input{width:100%;padding:12px;margin-top:15px;border-radius:5px;border:1px solid #ccc;box-sizing:border-box;font-size:14px;}\
button{margin-top:20px;padding:12px;width:100%;background:#007BFF;color:white;border:none;border-radius:5px;font-size:16px;}\
.info{color:#666;font-size:12px;margin-top:10px;}";

/// HTML-escapes the wrapped text when formatted.
pub struct Escaped<'a>(pub &'a str);

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rest = self.0;
        while let Some(i) = rest.find(['&', '<', '>', '"', '\'']) {
            f.write_str(&rest[..i])?;
            f.write_str(match rest.as_bytes()[i] {
                b'&' => "&amp;",
                b'<' => "&lt;",
                b'>' => "&gt;",
                b'"' => "&quot;",
                _ => "&#39;",
            })?;
            rest = &rest[i + 1..];
        }
        f.write_str(rest)
    }
}

fn open(out: &mut String, title: fmt::Arguments<'_>) {
    let _ = write!(
        out,
        "<!DOCTYPE html><html><head><meta charset='UTF-8'>\
         <meta name='viewport' content='width=device-width, initial-scale=1'>\
         <title>{}</title><style>{}</style></head><body><div class='card'>",
        title, STYLE
    );
}

fn close(out: &mut String) {
    out.push_str("</div></body></html>");
}

/// The configuration form, pre-filled from the current profile.
pub fn form(identity: &DeviceIdentity, profile: &DeviceProfile) -> String {
    let mut out = String::with_capacity(2048);
    open(
        &mut out,
        format_args!("Temperature sensor setup - {}", identity.short_id()),
    );
    let _ = write!(
        out,
        "<h2>Temperature sensor setup</h2>\
         <p style='color:#666;font-size:14px;'>Device ID: {short}</p>\
         <form method='POST' action='/save'>\
         <input name='ssid' placeholder='WiFi name (SSID)' required>\
         <input name='pass' type='password' placeholder='WiFi password' required>\
         <input name='name' placeholder='Device name' value='{name}'>\
         <input name='location' placeholder='Location' value='{location}'>\
         <input name='description' placeholder='Entity name' value='{description}'>\
         <button type='submit'>Save and restart</button>\
         <p class='info'>Unique ID: {full}</p>\
         </form>",
        short = identity.short_id(),
        full = identity.full_id(),
        name = Escaped(&profile.display_name),
        location = Escaped(&profile.location),
        description = Escaped(&profile.friendly_description),
    );
    close(&mut out);
    out
}

pub fn saved(ssid: &str, profile: &DeviceProfile) -> String {
    let mut out = String::with_capacity(1024);
    open(&mut out, format_args!("Saved"));
    let _ = write!(
        out,
        "<h2>Settings saved</h2>\
         <p>The device restarts and joins the network now.</p>\
         <p>SSID: {}</p><p>Name: {}</p><p>Entity: {}</p><p>Location: {}</p>",
        Escaped(ssid),
        Escaped(&profile.display_name),
        Escaped(&profile.friendly_description),
        Escaped(&profile.location),
    );
    close(&mut out);
    out
}

pub fn error(err: &ConfigError) -> String {
    let mut out = String::with_capacity(1024);
    open(&mut out, format_args!("Error"));
    let _ = write!(
        out,
        "<h2>Error</h2><p>{}</p><p>WiFi name and password must not be empty.</p>\
         <p><a href='/'>Back to the form</a></p>",
        err
    );
    close(&mut out);
    out
}

pub fn not_found() -> String {
    let mut out = String::with_capacity(512);
    open(&mut out, format_args!("Not found"));
    out.push_str("<h2>Not found</h2><p><a href='/'>Configuration form</a></p>");
    close(&mut out);
    out
}

pub fn bad_request() -> String {
    let mut out = String::with_capacity(512);
    open(&mut out, format_args!("Bad request"));
    out.push_str("<h2>Bad request</h2><p><a href='/'>Configuration form</a></p>");
    close(&mut out);
    out
}

pub fn method_not_allowed() -> String {
    let mut out = String::with_capacity(512);
    open(&mut out, format_args!("Method not allowed"));
    out.push_str("<h2>Method not allowed</h2>");
    close(&mut out);
    out
}
