//! Page scripts. Every script that returns data returns `JSON.stringify`
//! output so drivers only ever move strings across the protocol boundary.

use serde_json::Value;

/// Quote a Rust string as a JavaScript string literal.
pub fn js_string(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

/// Helpers shared by the describing scripts: text normalisation, a CSS
/// locator, a positional ancestor path and the element descriptor itself.
const DESCRIBE_PRELUDE: &str = r#"
const text = (n) => ((n && n.textContent) || '').replace(/\s+/g, ' ').trim();

const cssPath = (el) => {
  if (el.id) return '#' + CSS.escape(el.id);
  const tag = el.tagName.toLowerCase();
  const name = el.getAttribute('name');
  if (name) {
    const sel = tag + '[name="' + name.replace(/"/g, '\\"') + '"]';
    if (document.querySelectorAll(sel).length === 1) return sel;
  }
  const parts = [];
  let node = el;
  while (node && node.nodeType === 1 && node !== document.documentElement) {
    if (node.id) { parts.unshift('#' + CSS.escape(node.id)); break; }
    let part = node.tagName.toLowerCase();
    const parent = node.parentElement;
    if (parent) {
      const same = Array.from(parent.children).filter(c => c.tagName === node.tagName);
      if (same.length > 1) part += ':nth-of-type(' + (same.indexOf(node) + 1) + ')';
    }
    parts.unshift(part);
    node = parent;
  }
  return parts.join(' > ');
};

const structuralPath = (el) => {
  const parts = [];
  let node = el;
  while (node && node.nodeType === 1) {
    const parent = node.parentElement || (node.getRootNode && node.getRootNode().host) || null;
    const siblings = node.parentElement ? Array.from(node.parentElement.children) : [node];
    parts.unshift(node.tagName.toLowerCase() + '[' + (siblings.indexOf(node) + 1) + ']');
    node = parent;
  }
  return '/' + parts.join('/');
};

const describe = (el) => {
  const rect = el.getBoundingClientRect();
  const style = window.getComputedStyle(el);
  const forLabel = el.id
    ? text(document.querySelector('label[for="' + CSS.escape(el.id) + '"]'))
    : '';
  const ancestor = el.closest('label');
  const labelledby = (el.getAttribute('aria-labelledby') || '')
    .split(/\s+/)
    .filter(Boolean)
    .map(id => text(document.getElementById(id)))
    .join(' ')
    .trim();
  const attrTab = el.getAttribute('tabindex');
  return {
    tag: el.tagName.toLowerCase(),
    type: (el.getAttribute('type') || '').toLowerCase(),
    id: el.id || '',
    name: el.getAttribute('name') || '',
    role: el.getAttribute('role') || '',
    contentEditable: !!el.isContentEditable,
    hasHref: el.hasAttribute('href'),
    forLabel: forLabel,
    ancestorLabel: ancestor ? text(ancestor) : '',
    ariaLabel: el.getAttribute('aria-label') || '',
    labelledbyText: labelledby,
    placeholder: el.getAttribute('placeholder') || '',
    text: text(el).slice(0, 200),
    required: !!el.required || el.getAttribute('aria-required') === 'true',
    disabled: !!el.disabled,
    readOnly: !!el.readOnly,
    display: style.display,
    visibility: style.visibility,
    opacity: parseFloat(style.opacity),
    pointerEvents: style.pointerEvents,
    rect: { x: rect.x, y: rect.y, width: rect.width, height: rect.height },
    tabIndexAttr: attrTab === null ? null : parseInt(attrTab, 10),
    options: el.tagName === 'SELECT'
      ? Array.from(el.options).map(o => ({ value: o.value, text: text(o) }))
      : [],
    selector: cssPath(el),
    path: structuralPath(el),
  };
};
"#;

const INTERACTIVE_BODY: &str = r#"
const nodes = Array.from(document.querySelectorAll(
  'input, textarea, select, [role="textbox"], [contenteditable], button, a[href], [role="button"]'
));
return JSON.stringify(nodes.map(describe));
"#;

const FOCUSED_BODY: &str = r#"
let el = document.activeElement;
while (el && el.shadowRoot && el.shadowRoot.activeElement) {
  el = el.shadowRoot.activeElement;
}
if (!el || el === document.body || el === document.documentElement) {
  return JSON.stringify(null);
}
return JSON.stringify(describe(el));
"#;

const VALIDATION_BODY: &str = r#"
const markers = '[aria-invalid="true"], .error, .invalid, .is-invalid, .has-error, .validation-error, .field-error';
const found = Array.from(document.querySelectorAll(markers)).filter(el => {
  const r = el.getBoundingClientRect();
  const s = window.getComputedStyle(el);
  return s.display !== 'none' && s.visibility !== 'hidden' && r.width > 0 && r.height > 0;
});
return JSON.stringify(found.map(el => {
  const ref = el.getAttribute('aria-errormessage');
  const referenced = ref ? text(document.getElementById(ref)) : '';
  return {
    message: referenced || text(el) || el.validationMessage || 'Validation error',
    selector: cssPath(el),
  };
}));
"#;

pub const FOCUS_BODY: &str = r#"
(() => {
  const active = document.activeElement;
  if (active && active.blur) active.blur();
  if (document.body) {
    document.body.setAttribute('tabindex', '-1');
    document.body.focus();
    document.body.removeAttribute('tabindex');
  }
  return JSON.stringify(null);
})()
"#;

pub const VISIBLE_TEXT: &str =
    "JSON.stringify(document.body ? document.body.innerText : '')";

pub const SUBMIT_FIRST_FORM: &str = r#"
(() => {
  const form = document.forms[0];
  if (!form) return JSON.stringify(false);
  if (form.requestSubmit) { form.requestSubmit(); } else { form.submit(); }
  return JSON.stringify(true);
})()
"#;

/// Function declaration run against an element to empty it.
pub const CLEAR_ELEMENT_FN: &str = r#"
function() {
  if (this.isContentEditable) { this.innerText = ''; } else { this.value = ''; }
  this.dispatchEvent(new Event('input', { bubbles: true }));
  return true;
}
"#;

fn with_prelude(body: &str) -> String {
    format!("(() => {{\n{}\n{}\n}})()", DESCRIBE_PRELUDE, body)
}

pub fn interactive_elements() -> String {
    with_prelude(INTERACTIVE_BODY)
}

pub fn focused_element() -> String {
    with_prelude(FOCUSED_BODY)
}

pub fn validation_errors() -> String {
    with_prelude(VALIDATION_BODY)
}

/// Current value of one element plus its canonical locator, or null.
pub fn field_state(selector: &str) -> String {
    with_prelude(&format!(
        r#"
const el = document.querySelector({selector});
if (!el) return JSON.stringify(null);
return JSON.stringify({{
  type: (el.type || '').toLowerCase(),
  value: el.isContentEditable ? el.innerText : (el.value || ''),
  checked: !!el.checked,
  selector: cssPath(el),
}});
"#,
        selector = js_string(selector)
    ))
}

/// Returns `"ok"`, `"missing"` (no element) or `"no_option"`.
pub fn select_option(selector: &str, value: &str) -> String {
    format!(
        r#"
(() => {{
  const el = document.querySelector({selector});
  if (!el) return 'missing';
  const match = Array.from(el.options || []).find(o => o.value === {value});
  if (!match) return 'no_option';
  el.value = match.value;
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return 'ok';
}})()
"#,
        selector = js_string(selector),
        value = js_string(value)
    )
}

/// Clicks the control only when its state differs, so page listeners fire.
pub fn set_checked(selector: &str, checked: bool) -> String {
    format!(
        r#"
(() => {{
  const el = document.querySelector({selector});
  if (!el) return false;
  if (!!el.checked !== {checked}) el.click();
  return !!el.checked === {checked};
}})()
"#,
        selector = js_string(selector),
        checked = checked
    )
}
