// 缓存键生成函数

pub fn token_key(token: &str) -> String {
    format!("token:{}", token)
}

pub fn oauth_state_key(state: &str) -> String {
    format!("oauth_state:{}", state)
}

pub fn send_code_cooldown_key(email: &str) -> String {
    format!("send_code:{}", email)
}

pub fn rate_limit_key(ip: &str) -> String {
    format!("rate_limit:{}", ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(token_key("abc"), "token:abc");
        assert_eq!(oauth_state_key("s1"), "oauth_state:s1");
        assert_eq!(send_code_cooldown_key("a@b.co"), "send_code:a@b.co");
        assert_eq!(rate_limit_key("127.0.0.1"), "rate_limit:127.0.0.1");
    }
}
