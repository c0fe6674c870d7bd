//! Dockerfile and script templates for the build and contest tools

pub const DOCKERFILE_PYTHON_APP: &str = r#"FROM python:3.14.0b3-alpine3.21

RUN apk add --no-cache git grep

WORKDIR /app

RUN git clone {{GITHUB_URL}} .

RUN if [ -f "requirements.txt" ]; then pip install --no-cache-dir -r requirements.txt; fi
RUN if [ -f "pyproject.toml" ]; then pip install --no-cache-dir .; fi

ENV DEFAULT_PORT={{PORT}}

RUN printf '%s\n' \
    '#!/bin/sh' \
    'echo "Using port: ${DEFAULT_PORT}"' \
    'for entry in app.py main.py run.py; do' \
    '  if [ -f "$entry" ]; then exec python "$entry" --port "${DEFAULT_PORT}"; fi' \
    'done' \
    'exec python app.py --port "${DEFAULT_PORT}"' \
    > /entrypoint.sh && chmod +x /entrypoint.sh

EXPOSE {{PORT}}
CMD ["/entrypoint.sh"]
"#;

pub const DOCKERFILE_NODE_APP: &str = r#"FROM node:24-alpine3.21

RUN apk add --no-cache git grep

WORKDIR /app

RUN git clone {{GITHUB_URL}} .

RUN npm install

ENV DEFAULT_PORT={{PORT}}

RUN printf '%s\n' \
    '#!/bin/sh' \
    'echo "Using port: ${DEFAULT_PORT}"' \
    'main_file=index.js' \
    'if [ -f package.json ]; then main_file=$(node -p "require(\"./package.json\").main || \"index.js\""); fi' \
    'PORT="${DEFAULT_PORT}" exec node "$main_file"' \
    > /entrypoint.sh && chmod +x /entrypoint.sh

EXPOSE {{PORT}}
CMD ["/entrypoint.sh"]
"#;

pub const DOCKERFILE_IMAGE_PROCESSING: &str = r#"FROM python:3.10-slim

RUN apt-get update && apt-get install -y \
    git \
    libgl1-mesa-glx \
    libglib2.0-0 \
    libsm6 \
    libxext6 \
    libxrender-dev \
    libgomp1 \
    && pip install --no-cache-dir opencv-python numpy matplotlib pillow scikit-image \
    && apt-get clean \
    && rm -rf /var/lib/apt/lists/*

WORKDIR /app

COPY code/ /app/
COPY input/ /input/
VOLUME /output/

CMD ["python", "main.py"]
"#;

pub const DOCKERFILE_REACT_CONTEST: &str = r#"FROM mcr.microsoft.com/playwright/python:v1.44.0-focal

RUN apt-get update && \
    apt-get install -y curl netcat && \
    curl -fsSL https://deb.nodesource.com/setup_current.x | bash - && \
    apt-get install -y nodejs && \
    rm -rf /var/lib/apt/lists/*

WORKDIR /app

COPY code/package*.json /app/
RUN npm install

COPY code/ /app/
COPY run_all.sh /app/run_all.sh

RUN pip install --upgrade pip && pip install playwright
RUN playwright install --with-deps

{{BUILD_STEP}}

RUN chmod +x /app/run_all.sh

RUN mkdir -p /app/output
VOLUME /app/output

EXPOSE {{PORT}}

CMD ["/bin/bash", "/app/run_all.sh"]
"#;

pub const DEFAULT_REACT_BUILD_STEP: &str =
    r#"RUN if [ -f package.json ] && grep -q "\"build\"" package.json; then npm run build; fi"#;

/// Entrypoint for the React contest container: pick a start script, start the
/// app, wait for its port, then run the Playwright checks.
pub const REACT_RUN_ALL_SH: &str = r#"#!/bin/bash
set -e
PORT=${REACT_PORT:-5173}
HEADLESS=${HEADLESS:-true}

if [ ! -f "/app/package.json" ]; then
    echo "Error: package.json not found in /app/"
    exit 1
fi

if grep -q "\"preview\"" /app/package.json; then
    START_CMD="npm run preview -- --host 0.0.0.0 --port $PORT"
elif grep -q "\"dev\"" /app/package.json; then
    START_CMD="npm run dev -- --host 0.0.0.0 --port $PORT"
elif grep -q "\"start\"" /app/package.json; then
    START_CMD="npm start"
else
    echo "Error: No suitable npm script found (preview, dev, or start)"
    exit 1
fi

CUSTOM_START_CMD={{START_COMMAND}}
if [ -n "$CUSTOM_START_CMD" ]; then
    START_CMD="$CUSTOM_START_CMD"
fi

echo "Running: $START_CMD"
bash -c "$START_CMD" > /app/preview.log 2>&1 &
APP_PID=$!

echo "Waiting for React app on port $PORT..."
for i in $(seq 1 30); do
    if nc -z localhost "$PORT" 2>/dev/null; then
        echo "Port $PORT is now open!"
        break
    fi
    echo "Attempt $i/30: Waiting for React app on port $PORT..."
    sleep 1
done

if ! nc -z localhost "$PORT" 2>/dev/null; then
    echo "Preview server failed to start."
    if kill -0 $APP_PID 2>/dev/null; then
        echo "App process is still running (PID: $APP_PID)"
    else
        echo "App process has died"
    fi
    echo "Preview log output:"
    cat /app/preview.log
    if [ -d "/app/dist" ]; then
        ls -la /app/dist/
    elif [ -d "/app/build" ]; then
        ls -la /app/build/
    else
        echo "No dist/ or build/ directory found"
    fi
    exit 1
fi

echo "React app is running on port $PORT, starting Playwright tests..."
cd /app
python /app/playwright_test.py

if kill -0 $APP_PID 2>/dev/null; then
    kill $APP_PID
fi

if [ -f "/app/test_results.json" ]; then
    cp /app/test_results.json /app/output/
    echo "Results copied to output directory"
else
    echo "No test results found"
    exit 1
fi
"#;

pub const PLAYWRIGHT_TEST_PY: &str = r#"import base64
import json
import os

from playwright.sync_api import sync_playwright


def encode_image_to_base64(image_path):
    with open(image_path, "rb") as image_file:
        return base64.b64encode(image_file.read()).decode("utf-8")


def main():
    port = int(os.environ.get("REACT_PORT", 3000))
    headless = os.environ.get("HEADLESS", "true").lower() == "true"
    results = {}
    screenshots = {}
    console_errors = []
    with sync_playwright() as p:
        browser = p.firefox.launch(headless=headless)
        page = browser.new_page()
        page.on("console", lambda msg: console_errors.append(msg.text) if msg.type == "error" else None)
        page.goto(f"http://localhost:{port}", timeout=15000)
        results["header_exists"] = page.query_selector("header") is not None
        results["footer_exists"] = page.query_selector("footer") is not None
        results["nav_exists"] = page.query_selector("nav") is not None
        results["main_exists"] = page.query_selector("main") is not None
        results["form_count"] = len(page.query_selector_all("form"))
        results["button_count"] = len(page.query_selector_all("button"))
        page.set_viewport_size({"width": 1920, "height": 1080})
        page.screenshot(path="/app/screenshot_desktop.png")
        screenshots["desktop"] = encode_image_to_base64("/app/screenshot_desktop.png")
        page.set_viewport_size({"width": 375, "height": 667})
        page.screenshot(path="/app/screenshot_mobile.png")
        screenshots["mobile"] = encode_image_to_base64("/app/screenshot_mobile.png")
        buttons = page.query_selector_all("button")
        results["button_clickable"] = len(buttons) > 0 if buttons else None
        forms = page.query_selector_all("form")
        results["form_submittable"] = len(forms) > 0 if forms else None
        results["navigation_success"] = True
        browser.close()
    with open("/app/test_results.json", "w") as f:
        json.dump({
            "results": results,
            "screenshots": screenshots,
            "console_errors": console_errors,
            "message": "React contest tests completed",
        }, f)


if __name__ == "__main__":
    main()
"#;

/// Replace `{{PLACEHOLDER}}` patterns in a template string.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        let placeholder = format!("{{{{{}}}}}", key);
        result = result.replace(&placeholder, value);
    }
    result
}
